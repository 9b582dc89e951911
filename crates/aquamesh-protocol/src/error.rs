//! Error types for protocol operations

use thiserror::Error;

use crate::header::HeaderKind;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Truncated {header} header: expected {expected} bytes, got {actual}")]
    Truncated {
        header: HeaderKind,
        expected: usize,
        actual: usize,
    },

    #[error("Header mismatch: expected {expected}, found {found}")]
    HeaderMismatch {
        expected: HeaderKind,
        found: HeaderKind,
    },

    #[error("Packet is empty")]
    EmptyPacket,

    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },
}
