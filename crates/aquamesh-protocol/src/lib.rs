//! AquaMesh Protocol Module
//!
//! Wire-level data structures for the underwater acoustic routing suite:
//! node addresses, fixed-point geometry, the fixed-layout header variants and
//! the LIFO header stack carried by every packet.

pub mod codec;
pub mod error;
pub mod header;
pub mod packet;
pub mod types;

pub use codec::{Header, Reader, Writer};
pub use error::{ProtocolError, Result};
pub use header::{
    AnyHeader, CommonHeader, DepthRoutingHeader, DiscoveryHeader, HeaderKind, ProbeReplyHeader,
    ProbeRequestHeader, RelayControlHeader, RoutingHeader, SignalingHeader, VbfExtraInfo,
    VectorForwardingHeader,
};
pub use packet::{HeaderRecord, Packet, MAX_PAYLOAD_SIZE};
pub use types::{
    decode_fixed, encode_fixed, DbrMode, Direction, NodeAddress, PacketType, Position,
    SignalingType, VbfMessageType,
};
