//! Routing error types

use aquamesh_protocol::NodeAddress;
use thiserror::Error;

/// Routing-specific errors
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("No relay available towards {destination}")]
    NoRelayAvailable { destination: NodeAddress },

    #[error("Pending queue for {destination} is full ({capacity} packets)")]
    QueueFull {
        destination: NodeAddress,
        capacity: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Node runtime stopped")]
    RuntimeStopped,

    #[error("Protocol error: {0}")]
    Protocol(#[from] aquamesh_protocol::ProtocolError),
}

/// Result type for routing operations
pub type Result<T> = std::result::Result<T, RoutingError>;
