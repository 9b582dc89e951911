//! DDoS signaling header

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::{Header, Reader, Writer};
use crate::error::Result;
use crate::header::HeaderKind;
use crate::types::SignalingType;

/// Signaling header (2 bytes): packet type tag and row index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingHeader {
    pub packet_type: SignalingType,
    /// Row of the anomaly table this message refers to
    pub row_index: u8,
}

impl Header for SignalingHeader {
    const KIND: HeaderKind = HeaderKind::Signaling;
    const SERIALIZED_SIZE: usize = 1 + 1;

    fn encode(&self, writer: &mut Writer) {
        writer.put_u8(self.packet_type.to_u8());
        writer.put_u8(self.row_index);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(SignalingHeader {
            packet_type: SignalingType::from_u8(reader.get_u8()?),
            row_index: reader.get_u8()?,
        })
    }
}

impl fmt::Display for SignalingHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DDoS Header is: PacketType={} RowIndex={}",
            self.packet_type, self.row_index
        )
    }
}
