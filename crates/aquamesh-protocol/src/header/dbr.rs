//! Depth-based routing header

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::{Header, Reader, Writer};
use crate::error::Result;
use crate::header::HeaderKind;
use crate::types::{DbrMode, NodeAddress, Position};

/// Depth-based routing header (27 bytes)
///
/// Layout:
/// - Position of the sender (12 bytes)
/// - Packet id (4 bytes)
/// - Mode (1 byte)
/// - Maximum hop count (2 bytes)
/// - Previous hop (2 bytes)
/// - Owner (2 bytes)
/// - Depth (4 bytes, fixed-point)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthRoutingHeader {
    pub position: Position,
    pub packet_id: u32,
    pub mode: DbrMode,
    pub max_hops: u16,
    pub prev_hop: NodeAddress,
    pub owner: NodeAddress,
    pub depth: f64,
}

impl Header for DepthRoutingHeader {
    const KIND: HeaderKind = HeaderKind::DepthRouting;
    const SERIALIZED_SIZE: usize = Position::SIZE + 4 + 1 + 2 + 2 + 2 + 4;

    fn encode(&self, writer: &mut Writer) {
        writer.put_position(&self.position);
        writer.put_u32(self.packet_id);
        writer.put_u8(self.mode.to_u8());
        writer.put_u16(self.max_hops);
        writer.put_address(self.prev_hop);
        writer.put_address(self.owner);
        writer.put_fixed(self.depth);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(DepthRoutingHeader {
            position: reader.get_position()?,
            packet_id: reader.get_u32()?,
            mode: DbrMode::from_u8(reader.get_u8()?),
            max_hops: reader.get_u16()?,
            prev_hop: reader.get_address()?,
            owner: reader.get_address()?,
            depth: reader.get_fixed()?,
        })
    }
}

impl fmt::Display for DepthRoutingHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Depth Based Routing Header is: position=({}) packetID={} mode={} maxNumHops={} \
             prevHopAddr={} ownerAddr={} depth={}",
            self.position,
            self.packet_id,
            self.mode,
            self.max_hops,
            self.prev_hop,
            self.owner,
            self.depth
        )
    }
}
