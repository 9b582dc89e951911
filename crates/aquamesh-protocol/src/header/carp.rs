//! Channel-aware routing headers: discovery, probes, probe replies and the
//! relay control record that tags every CARP packet with its type

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::{Header, Reader, Writer};
use crate::error::Result;
use crate::header::HeaderKind;
use crate::types::{NodeAddress, PacketType};

/// Discovery flood header (3 bytes)
///
/// `source` is the node that started the flood and never changes as the flood
/// spreads; `hop_count` grows by one per re-broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryHeader {
    pub source: NodeAddress,
    pub hop_count: u8,
}

impl DiscoveryHeader {
    pub fn new(source: NodeAddress) -> Self {
        DiscoveryHeader {
            source,
            hop_count: 0,
        }
    }

    /// Copy of this header one hop further from the origin
    pub fn next_hop(&self) -> Self {
        DiscoveryHeader {
            source: self.source,
            hop_count: self.hop_count.saturating_add(1),
        }
    }
}

impl Header for DiscoveryHeader {
    const KIND: HeaderKind = HeaderKind::Discovery;
    const SERIALIZED_SIZE: usize = 2 + 1;

    fn encode(&self, writer: &mut Writer) {
        writer.put_address(self.source);
        writer.put_u8(self.hop_count);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(DiscoveryHeader {
            source: reader.get_address()?,
            hop_count: reader.get_u8()?,
        })
    }
}

impl fmt::Display for DiscoveryHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Discovery Header is: src={} hopCount={}",
            self.source, self.hop_count
        )
    }
}

/// Probe request header (3 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRequestHeader {
    pub source: NodeAddress,
    /// Size of the probe train this probe belongs to
    pub probe_count: u8,
}

impl Header for ProbeRequestHeader {
    const KIND: HeaderKind = HeaderKind::ProbeRequest;
    const SERIALIZED_SIZE: usize = 2 + 1;

    fn encode(&self, writer: &mut Writer) {
        writer.put_address(self.source);
        writer.put_u8(self.probe_count);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(ProbeRequestHeader {
            source: reader.get_address()?,
            probe_count: reader.get_u8()?,
        })
    }
}

impl fmt::Display for ProbeRequestHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Probe Request Header is: src={} probeCount={}",
            self.source, self.probe_count
        )
    }
}

/// Probe reply header (14 bytes)
///
/// Layout:
/// - Source (2 bytes)
/// - Destination (2 bytes)
/// - Queue depth (1 byte)
/// - Residual energy (4 bytes, fixed-point)
/// - Hop count (1 byte)
/// - Link quality (4 bytes, fixed-point)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeReplyHeader {
    pub source: NodeAddress,
    pub destination: NodeAddress,
    pub queue_depth: u8,
    pub residual_energy: f64,
    pub hop_count: u8,
    pub link_quality: f64,
}

impl Header for ProbeReplyHeader {
    const KIND: HeaderKind = HeaderKind::ProbeReply;
    const SERIALIZED_SIZE: usize = 2 + 2 + 1 + 4 + 1 + 4;

    fn encode(&self, writer: &mut Writer) {
        writer.put_address(self.source);
        writer.put_address(self.destination);
        writer.put_u8(self.queue_depth);
        writer.put_fixed(self.residual_energy);
        writer.put_u8(self.hop_count);
        writer.put_fixed(self.link_quality);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(ProbeReplyHeader {
            source: reader.get_address()?,
            destination: reader.get_address()?,
            queue_depth: reader.get_u8()?,
            residual_energy: reader.get_fixed()?,
            hop_count: reader.get_u8()?,
            link_quality: reader.get_fixed()?,
        })
    }
}

impl fmt::Display for ProbeReplyHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Probe Reply Header is: src={} dst={} queue={} energy={} hopCount={} linkQuality={}",
            self.source,
            self.destination,
            self.queue_depth,
            self.residual_energy,
            self.hop_count,
            self.link_quality
        )
    }
}

/// Relay control header (7 bytes), present on every CARP packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayControlHeader {
    pub source: NodeAddress,
    pub destination: NodeAddress,
    pub packet_count: u8,
    pub hop_count: u8,
    pub packet_type: PacketType,
}

impl RelayControlHeader {
    pub fn new(packet_type: PacketType, source: NodeAddress, destination: NodeAddress) -> Self {
        RelayControlHeader {
            source,
            destination,
            packet_count: 1,
            hop_count: 0,
            packet_type,
        }
    }
}

impl Header for RelayControlHeader {
    const KIND: HeaderKind = HeaderKind::RelayControl;
    const SERIALIZED_SIZE: usize = 2 + 2 + 1 + 1 + 1;

    fn encode(&self, writer: &mut Writer) {
        writer.put_address(self.source);
        writer.put_address(self.destination);
        writer.put_u8(self.packet_count);
        writer.put_u8(self.hop_count);
        writer.put_u8(self.packet_type.to_u8());
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(RelayControlHeader {
            source: reader.get_address()?,
            destination: reader.get_address()?,
            packet_count: reader.get_u8()?,
            hop_count: reader.get_u8()?,
            packet_type: PacketType::from_u8(reader.get_u8()?),
        })
    }
}

impl fmt::Display for RelayControlHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Carp Routing Header is: src={} dst={} packetCount={} hopCount={} type={}",
            self.source, self.destination, self.packet_count, self.hop_count, self.packet_type
        )
    }
}
