//! Vector-based forwarding header

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::{Header, Reader, Writer};
use crate::error::Result;
use crate::header::HeaderKind;
use crate::types::{NodeAddress, Position, VbfMessageType};

/// Geometry carried along with a vector-forwarded packet
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VbfExtraInfo {
    /// Start point of the routing vector
    pub origin: Position,
    /// Position of the forwarder
    pub forwarder: Position,
    /// End point of the routing vector
    pub target: Position,
    /// Receiver position relative to the forwarder
    pub relative: Position,
}

/// Vector-based forwarding header (84 bytes)
///
/// Layout:
/// - Message type (1 byte)
/// - Packet number (4 bytes)
/// - Target, sender, forwarder addresses (2 bytes each)
/// - Data type (1 byte)
/// - Original source position (12 bytes)
/// - Token, timestamp, range (4 bytes each, fixed-point)
/// - Extra info: four positions (48 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorForwardingHeader {
    pub message_type: VbfMessageType,
    pub packet_number: u32,
    pub target: NodeAddress,
    pub sender: NodeAddress,
    pub forwarder: NodeAddress,
    pub data_type: u8,
    pub original_source: Position,
    pub token: f64,
    pub timestamp: f64,
    pub range: f64,
    pub extra: VbfExtraInfo,
}

impl VectorForwardingHeader {
    pub fn new(message_type: VbfMessageType, packet_number: u32) -> Self {
        VectorForwardingHeader {
            message_type,
            packet_number,
            target: NodeAddress::BROADCAST,
            sender: NodeAddress::new(0),
            forwarder: NodeAddress::new(0),
            data_type: 0,
            original_source: Position::default(),
            token: 0.0,
            timestamp: 0.0,
            range: 0.0,
            extra: VbfExtraInfo::default(),
        }
    }
}

impl Header for VectorForwardingHeader {
    const KIND: HeaderKind = HeaderKind::VectorForwarding;
    const SERIALIZED_SIZE: usize = 1 + 4 + 2 + 2 + 2 + 1 + Position::SIZE + 4 + 4 + 4 + 4 * Position::SIZE;

    fn encode(&self, writer: &mut Writer) {
        writer.put_u8(self.message_type.to_u8());
        writer.put_u32(self.packet_number);
        writer.put_address(self.target);
        writer.put_address(self.sender);
        writer.put_address(self.forwarder);
        writer.put_u8(self.data_type);
        writer.put_position(&self.original_source);
        writer.put_fixed(self.token);
        writer.put_fixed(self.timestamp);
        writer.put_fixed(self.range);
        writer.put_position(&self.extra.origin);
        writer.put_position(&self.extra.forwarder);
        writer.put_position(&self.extra.target);
        writer.put_position(&self.extra.relative);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(VectorForwardingHeader {
            message_type: VbfMessageType::from_u8(reader.get_u8()?),
            packet_number: reader.get_u32()?,
            target: reader.get_address()?,
            sender: reader.get_address()?,
            forwarder: reader.get_address()?,
            data_type: reader.get_u8()?,
            original_source: reader.get_position()?,
            token: reader.get_fixed()?,
            timestamp: reader.get_fixed()?,
            range: reader.get_fixed()?,
            extra: VbfExtraInfo {
                origin: reader.get_position()?,
                forwarder: reader.get_position()?,
                target: reader.get_position()?,
                relative: reader.get_position()?,
            },
        })
    }
}

impl fmt::Display for VectorForwardingHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Vector Based Routing Header is: messType={} pkNum={} targetAddr={} senderAddr={} \
             forwardAddr={} dataType={} originalSource={} token={} timestamp={} range={} \
             extraInfo=(o={} f={} t={} d={})",
            self.message_type,
            self.packet_number,
            self.target,
            self.sender,
            self.forwarder,
            self.data_type,
            self.original_source,
            self.token,
            self.timestamp,
            self.range,
            self.extra.origin,
            self.extra.forwarder,
            self.extra.target,
            self.extra.relative
        )
    }
}
