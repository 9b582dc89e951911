//! Dynamic routing header (routing table exchange record)

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::{Header, Reader, Writer};
use crate::error::Result;
use crate::header::HeaderKind;
use crate::types::NodeAddress;

/// Dynamic routing header (9 bytes)
///
/// Layout:
/// - Packet source (2 bytes)
/// - Total length (2 bytes)
/// - Sequence number (1 byte)
/// - Routing table entry count (4 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingHeader {
    pub source: NodeAddress,
    pub total_length: u16,
    pub sequence: u8,
    pub entry_count: u32,
}

impl Header for RoutingHeader {
    const KIND: HeaderKind = HeaderKind::Routing;
    const SERIALIZED_SIZE: usize = 2 + 2 + 1 + 4;

    fn encode(&self, writer: &mut Writer) {
        writer.put_address(self.source);
        writer.put_u16(self.total_length);
        writer.put_u8(self.sequence);
        writer.put_u32(self.entry_count);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(RoutingHeader {
            source: reader.get_address()?,
            total_length: reader.get_u16()?,
            sequence: reader.get_u8()?,
            entry_count: reader.get_u32()?,
        })
    }
}

impl fmt::Display for RoutingHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Dynamic Routing Header is: PktSrc={} PktLen={} PktSeqNum={} EntryNum={}",
            self.source, self.total_length, self.sequence, self.entry_count
        )
    }
}
