//! Header variants carried by acoustic network packets
//!
//! Every header is a fixed-size binary record. Packets stack headers LIFO as
//! they move through the protocol layers, so a receiver must know which
//! header it expects next; [`HeaderKind`] names them for stack checks and
//! error messages, and [`AnyHeader`] gives an enum-dispatched view when the
//! caller does need to handle several kinds uniformly.

mod carp;
mod common;
mod dbr;
mod dynamic;
mod signaling;
mod vbf;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::Header;
use crate::error::Result;

pub use carp::{DiscoveryHeader, ProbeReplyHeader, ProbeRequestHeader, RelayControlHeader};
pub use common::CommonHeader;
pub use dbr::DepthRoutingHeader;
pub use dynamic::RoutingHeader;
pub use signaling::SignalingHeader;
pub use vbf::{VbfExtraInfo, VectorForwardingHeader};

/// Identifies a header variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeaderKind {
    Common,
    Discovery,
    ProbeRequest,
    ProbeReply,
    Routing,
    RelayControl,
    VectorForwarding,
    DepthRouting,
    Signaling,
}

impl HeaderKind {
    /// Every header kind, in declaration order
    pub const ALL: [HeaderKind; 9] = [
        HeaderKind::Common,
        HeaderKind::Discovery,
        HeaderKind::ProbeRequest,
        HeaderKind::ProbeReply,
        HeaderKind::Routing,
        HeaderKind::RelayControl,
        HeaderKind::VectorForwarding,
        HeaderKind::DepthRouting,
        HeaderKind::Signaling,
    ];

    /// Fixed serialized size of this header kind
    pub fn serialized_size(&self) -> usize {
        match self {
            HeaderKind::Common => CommonHeader::SERIALIZED_SIZE,
            HeaderKind::Discovery => DiscoveryHeader::SERIALIZED_SIZE,
            HeaderKind::ProbeRequest => ProbeRequestHeader::SERIALIZED_SIZE,
            HeaderKind::ProbeReply => ProbeReplyHeader::SERIALIZED_SIZE,
            HeaderKind::Routing => RoutingHeader::SERIALIZED_SIZE,
            HeaderKind::RelayControl => RelayControlHeader::SERIALIZED_SIZE,
            HeaderKind::VectorForwarding => VectorForwardingHeader::SERIALIZED_SIZE,
            HeaderKind::DepthRouting => DepthRoutingHeader::SERIALIZED_SIZE,
            HeaderKind::Signaling => SignalingHeader::SERIALIZED_SIZE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HeaderKind::Common => "common",
            HeaderKind::Discovery => "discovery",
            HeaderKind::ProbeRequest => "probe-request",
            HeaderKind::ProbeReply => "probe-reply",
            HeaderKind::Routing => "dynamic-routing",
            HeaderKind::RelayControl => "relay-control",
            HeaderKind::VectorForwarding => "vector-forwarding",
            HeaderKind::DepthRouting => "depth-routing",
            HeaderKind::Signaling => "signaling",
        }
    }
}

impl fmt::Display for HeaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Any header, tagged by kind
#[derive(Debug, Clone, PartialEq)]
pub enum AnyHeader {
    Common(CommonHeader),
    Discovery(DiscoveryHeader),
    ProbeRequest(ProbeRequestHeader),
    ProbeReply(ProbeReplyHeader),
    Routing(RoutingHeader),
    RelayControl(RelayControlHeader),
    VectorForwarding(VectorForwardingHeader),
    DepthRouting(DepthRoutingHeader),
    Signaling(SignalingHeader),
}

impl AnyHeader {
    /// Decode a header of the given kind from the start of `bytes`
    pub fn decode(kind: HeaderKind, bytes: &[u8]) -> Result<Self> {
        Ok(match kind {
            HeaderKind::Common => AnyHeader::Common(CommonHeader::from_bytes(bytes)?),
            HeaderKind::Discovery => AnyHeader::Discovery(DiscoveryHeader::from_bytes(bytes)?),
            HeaderKind::ProbeRequest => {
                AnyHeader::ProbeRequest(ProbeRequestHeader::from_bytes(bytes)?)
            }
            HeaderKind::ProbeReply => AnyHeader::ProbeReply(ProbeReplyHeader::from_bytes(bytes)?),
            HeaderKind::Routing => AnyHeader::Routing(RoutingHeader::from_bytes(bytes)?),
            HeaderKind::RelayControl => {
                AnyHeader::RelayControl(RelayControlHeader::from_bytes(bytes)?)
            }
            HeaderKind::VectorForwarding => {
                AnyHeader::VectorForwarding(VectorForwardingHeader::from_bytes(bytes)?)
            }
            HeaderKind::DepthRouting => {
                AnyHeader::DepthRouting(DepthRoutingHeader::from_bytes(bytes)?)
            }
            HeaderKind::Signaling => AnyHeader::Signaling(SignalingHeader::from_bytes(bytes)?),
        })
    }

    pub fn kind(&self) -> HeaderKind {
        match self {
            AnyHeader::Common(_) => HeaderKind::Common,
            AnyHeader::Discovery(_) => HeaderKind::Discovery,
            AnyHeader::ProbeRequest(_) => HeaderKind::ProbeRequest,
            AnyHeader::ProbeReply(_) => HeaderKind::ProbeReply,
            AnyHeader::Routing(_) => HeaderKind::Routing,
            AnyHeader::RelayControl(_) => HeaderKind::RelayControl,
            AnyHeader::VectorForwarding(_) => HeaderKind::VectorForwarding,
            AnyHeader::DepthRouting(_) => HeaderKind::DepthRouting,
            AnyHeader::Signaling(_) => HeaderKind::Signaling,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            AnyHeader::Common(h) => h.to_bytes(),
            AnyHeader::Discovery(h) => h.to_bytes(),
            AnyHeader::ProbeRequest(h) => h.to_bytes(),
            AnyHeader::ProbeReply(h) => h.to_bytes(),
            AnyHeader::Routing(h) => h.to_bytes(),
            AnyHeader::RelayControl(h) => h.to_bytes(),
            AnyHeader::VectorForwarding(h) => h.to_bytes(),
            AnyHeader::DepthRouting(h) => h.to_bytes(),
            AnyHeader::Signaling(h) => h.to_bytes(),
        }
    }

    pub fn serialized_size(&self) -> usize {
        self.kind().serialized_size()
    }
}

impl fmt::Display for AnyHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyHeader::Common(h) => write!(f, "{}", h),
            AnyHeader::Discovery(h) => write!(f, "{}", h),
            AnyHeader::ProbeRequest(h) => write!(f, "{}", h),
            AnyHeader::ProbeReply(h) => write!(f, "{}", h),
            AnyHeader::Routing(h) => write!(f, "{}", h),
            AnyHeader::RelayControl(h) => write!(f, "{}", h),
            AnyHeader::VectorForwarding(h) => write!(f, "{}", h),
            AnyHeader::DepthRouting(h) => write!(f, "{}", h),
            AnyHeader::Signaling(h) => write!(f, "{}", h),
        }
    }
}
