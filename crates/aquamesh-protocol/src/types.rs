//! Core protocol types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scale applied to floating point fields before they go on the wire
pub const FIXED_POINT_SCALE: f64 = 1000.0;

/// Address of a node on the acoustic network
///
/// Addresses are written as 16-bit big-endian integers. The value 255 is
/// reserved as the broadcast address, matching the link layer convention.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddress(u16);

impl NodeAddress {
    /// Broadcast address (every node in range)
    pub const BROADCAST: NodeAddress = NodeAddress(255);

    /// Create an address from its integer form
    pub const fn new(value: u16) -> Self {
        NodeAddress(value)
    }

    /// Get the integer form written on the wire
    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// Check if this is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl From<u16> for NodeAddress {
    fn from(value: u16) -> Self {
        NodeAddress(value)
    }
}

impl fmt::Debug for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_broadcast() {
            write!(f, "NodeAddress(BROADCAST)")
        } else {
            write!(f, "NodeAddress({})", self.0)
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encode a real value as an unsigned fixed-point integer (three decimals)
///
/// Rounds half up. The cast saturates: negative inputs encode as 0 and values
/// beyond the u32 range encode as `u32::MAX`.
pub fn encode_fixed(value: f64) -> u32 {
    (value * FIXED_POINT_SCALE + 0.5) as u32
}

/// Decode a fixed-point integer back into a real value
pub fn decode_fixed(encoded: u32) -> f64 {
    encoded as f64 / FIXED_POINT_SCALE
}

/// A point in 3-D space (meters)
///
/// Coordinates go on the wire as unsigned fixed-point values, so they must be
/// non-negative: a negative coordinate is sent as 0. Place the origin of the
/// deployment at a corner rather than in its middle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    /// Wire size: three fixed-point u32 coordinates
    pub const SIZE: usize = 12;

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Position { x, y, z }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.x, self.y, self.z)
    }
}

/// CARP packet type carried by the relay control header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketType {
    /// Acknowledgment of a probe (0x00)
    Ack,
    /// Application data (0x01)
    Data,
    /// Link-quality probe (0x02)
    Probe,
    /// Neighbor discovery flood (0x03)
    Discovery,
    /// Unrecognized tag, kept verbatim
    Unknown(u8),
}

impl PacketType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => PacketType::Ack,
            0x01 => PacketType::Data,
            0x02 => PacketType::Probe,
            0x03 => PacketType::Discovery,
            other => PacketType::Unknown(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            PacketType::Ack => 0x00,
            PacketType::Data => 0x01,
            PacketType::Probe => 0x02,
            PacketType::Discovery => 0x03,
            PacketType::Unknown(other) => other,
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketType::Ack => write!(f, "ACK"),
            PacketType::Data => write!(f, "DATA"),
            PacketType::Probe => write!(f, "PROBE"),
            PacketType::Discovery => write!(f, "DISCOVERY"),
            PacketType::Unknown(v) => write!(f, "UNKNOWN({})", v),
        }
    }
}

/// Direction of travel through the protocol stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Down,
    Up,
    NotSet,
    Unknown(u8),
}

impl Direction {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Direction::Down,
            1 => Direction::Up,
            2 => Direction::NotSet,
            other => Direction::Unknown(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Direction::Down => 0,
            Direction::Up => 1,
            Direction::NotSet => 2,
            Direction::Unknown(other) => other,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Down => write!(f, "DOWN"),
            Direction::Up => write!(f, "UP"),
            Direction::NotSet => write!(f, "NOT_SET"),
            Direction::Unknown(v) => write!(f, "UNKNOWN({})", v),
        }
    }
}

/// Vector-based forwarding message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VbfMessageType {
    Interest,
    Data,
    DataReady,
    SourceDiscovery,
    SourceTimeout,
    TargetDiscovery,
    TargetRequest,
    SourceDeny,
    VShift,
    Flooding,
    DataTermination,
    Backpressure,
    Backflooding,
    Expansion,
    VShiftData,
    ExpansionData,
    Unknown(u8),
}

impl VbfMessageType {
    const TABLE: [VbfMessageType; 16] = [
        VbfMessageType::Interest,
        VbfMessageType::Data,
        VbfMessageType::DataReady,
        VbfMessageType::SourceDiscovery,
        VbfMessageType::SourceTimeout,
        VbfMessageType::TargetDiscovery,
        VbfMessageType::TargetRequest,
        VbfMessageType::SourceDeny,
        VbfMessageType::VShift,
        VbfMessageType::Flooding,
        VbfMessageType::DataTermination,
        VbfMessageType::Backpressure,
        VbfMessageType::Backflooding,
        VbfMessageType::Expansion,
        VbfMessageType::VShiftData,
        VbfMessageType::ExpansionData,
    ];

    pub fn from_u8(value: u8) -> Self {
        Self::TABLE
            .get(value as usize)
            .copied()
            .unwrap_or(VbfMessageType::Unknown(value))
    }

    pub fn to_u8(self) -> u8 {
        match self {
            VbfMessageType::Unknown(v) => v,
            known => Self::TABLE
                .iter()
                .position(|t| *t == known)
                .map(|i| i as u8)
                .unwrap_or_default(),
        }
    }

    /// Name used when printing headers
    pub fn name(&self) -> &'static str {
        match self {
            VbfMessageType::Interest => "INTEREST",
            VbfMessageType::Data => "DATA",
            VbfMessageType::DataReady => "DATA_READY",
            VbfMessageType::SourceDiscovery => "SOURCE_DISCOVERY",
            VbfMessageType::SourceTimeout => "SOURCE_TIMEOUT",
            VbfMessageType::TargetDiscovery => "TARGET_DISCOVERY",
            VbfMessageType::TargetRequest => "TARGET_REQUEST",
            VbfMessageType::SourceDeny => "SOURCE_DENY",
            VbfMessageType::VShift => "V_SHIFT",
            VbfMessageType::Flooding => "FLOODING",
            VbfMessageType::DataTermination => "DATA_TERMINATION",
            VbfMessageType::Backpressure => "BACKPRESSURE",
            VbfMessageType::Backflooding => "BACKFLOODING",
            VbfMessageType::Expansion => "EXPENSION",
            VbfMessageType::VShiftData => "V_SHIFT_DATA",
            VbfMessageType::ExpansionData => "EXPENSION_DATA",
            VbfMessageType::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for VbfMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VbfMessageType::Unknown(v) => write!(f, "UNKNOWN({})", v),
            known => write!(f, "{}", known.name()),
        }
    }
}

/// Depth-based routing forwarding mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbrMode {
    DataGreedy,
    DataRecover,
    Beacon,
    Unknown(u8),
}

impl DbrMode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => DbrMode::DataGreedy,
            1 => DbrMode::DataRecover,
            2 => DbrMode::Beacon,
            other => DbrMode::Unknown(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            DbrMode::DataGreedy => 0,
            DbrMode::DataRecover => 1,
            DbrMode::Beacon => 2,
            DbrMode::Unknown(other) => other,
        }
    }
}

impl fmt::Display for DbrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbrMode::DataGreedy => write!(f, "DBRH_DATA_GREEDY"),
            DbrMode::DataRecover => write!(f, "DBRH_DATA_RECOVER"),
            DbrMode::Beacon => write!(f, "DBRH_BEACON"),
            DbrMode::Unknown(v) => write!(f, "UNKNOWN({})", v),
        }
    }
}

/// Packet type of the anomaly/DDoS signaling header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalingType {
    Interest,
    Data,
    Nack,
    Alert,
    Unknown(u8),
}

impl SignalingType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => SignalingType::Interest,
            1 => SignalingType::Data,
            2 => SignalingType::Nack,
            3 => SignalingType::Alert,
            other => SignalingType::Unknown(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            SignalingType::Interest => 0,
            SignalingType::Data => 1,
            SignalingType::Nack => 2,
            SignalingType::Alert => 3,
            SignalingType::Unknown(other) => other,
        }
    }
}

impl fmt::Display for SignalingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalingType::Interest => write!(f, "INTEREST"),
            SignalingType::Data => write!(f, "DATA"),
            SignalingType::Nack => write!(f, "NACK"),
            SignalingType::Alert => write!(f, "ALERT"),
            SignalingType::Unknown(v) => write!(f, "UNKNOWN({})", v),
        }
    }
}
