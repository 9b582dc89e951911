//! Per-hop link header carried in front of every routed packet

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::{Header, Reader, Writer};
use crate::error::Result;
use crate::header::HeaderKind;
use crate::types::{Direction, NodeAddress};

/// Common routing header (13 bytes)
///
/// Layout:
/// - Source (2 bytes)
/// - Destination (2 bytes)
/// - Next hop (2 bytes)
/// - Number of forwards (2 bytes)
/// - Direction (1 byte)
/// - Packet uid (4 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonHeader {
    /// Originating node (for data) or transmitting node (for floods)
    pub source: NodeAddress,

    /// Final destination
    pub destination: NodeAddress,

    /// Node expected to handle this transmission, or broadcast
    pub next_hop: NodeAddress,

    /// How many times the packet has been relayed
    pub num_forwards: u16,

    pub direction: Direction,

    /// Packet id, discovery sequence number or probe round id
    pub uid: u32,
}

impl CommonHeader {
    pub fn new(source: NodeAddress, destination: NodeAddress, next_hop: NodeAddress) -> Self {
        CommonHeader {
            source,
            destination,
            next_hop,
            num_forwards: 0,
            direction: Direction::Down,
            uid: 0,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = uid;
        self
    }

    pub fn with_num_forwards(mut self, num_forwards: u16) -> Self {
        self.num_forwards = num_forwards;
        self
    }
}

impl Header for CommonHeader {
    const KIND: HeaderKind = HeaderKind::Common;
    const SERIALIZED_SIZE: usize = 2 + 2 + 2 + 2 + 1 + 4;

    fn encode(&self, writer: &mut Writer) {
        writer.put_address(self.source);
        writer.put_address(self.destination);
        writer.put_address(self.next_hop);
        writer.put_u16(self.num_forwards);
        writer.put_u8(self.direction.to_u8());
        writer.put_u32(self.uid);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(CommonHeader {
            source: reader.get_address()?,
            destination: reader.get_address()?,
            next_hop: reader.get_address()?,
            num_forwards: reader.get_u16()?,
            direction: Direction::from_u8(reader.get_u8()?),
            uid: reader.get_u32()?,
        })
    }
}

impl fmt::Display for CommonHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Common Header is: src={} dst={} nextHop={} numForwards={} direction={} uid={}",
            self.source, self.destination, self.next_hop, self.num_forwards, self.direction, self.uid
        )
    }
}
