//! Per-hop forwarding decisions
//!
//! These functions only look at the header and the local address; the router
//! applies the verdict. A header is only rewritten (by [`stamp`]) once the
//! packet is actually relayed.

use aquamesh_protocol::{CommonHeader, NodeAddress, PacketType};
use std::fmt;

/// Why a packet was not delivered or relayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Our own packet came back after being relayed
    Loop,
    /// Overheard traffic addressed to another next hop
    Foreign,
    /// Relayed too many times
    HopLimit,
    /// Already delivered to the application
    Duplicate,
    /// Headers could not be decoded
    Malformed,
    /// No candidate relay towards the destination
    NoRelay,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DropReason::Loop => "loop",
            DropReason::Foreign => "foreign",
            DropReason::HopLimit => "hop limit",
            DropReason::Duplicate => "duplicate",
            DropReason::Malformed => "malformed",
            DropReason::NoRelay => "no relay",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Deliver,
    Relay,
    Drop(DropReason),
}

/// Loop and overhearing checks, applied to every received packet
///
/// A packet this node originated and nobody has relayed yet always passes.
pub fn screen(common: &CommonHeader, local: NodeAddress) -> Option<DropReason> {
    if common.source == local {
        return (common.num_forwards > 0).then_some(DropReason::Loop);
    }
    if !common.next_hop.is_broadcast() && common.next_hop != local {
        return Some(DropReason::Foreign);
    }
    None
}

/// Decide what to do with a data-path packet at this hop
pub fn classify(
    common: &CommonHeader,
    packet_type: PacketType,
    local: NodeAddress,
    max_hops: u16,
) -> Verdict {
    if let Some(reason) = screen(common, local) {
        return Verdict::Drop(reason);
    }
    if common.source == local {
        return Verdict::Relay;
    }
    if common.destination == local && packet_type == PacketType::Data {
        return Verdict::Deliver;
    }
    if common.num_forwards >= max_hops {
        return Verdict::Drop(DropReason::HopLimit);
    }
    Verdict::Relay
}

/// Header for the next transmission of a relayed packet
pub fn stamp(common: &CommonHeader, next_hop: NodeAddress) -> CommonHeader {
    CommonHeader {
        next_hop,
        num_forwards: common.num_forwards.saturating_add(1),
        ..*common
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: NodeAddress = NodeAddress::new(5);

    fn header(source: u16, destination: u16, next_hop: NodeAddress, forwards: u16) -> CommonHeader {
        CommonHeader::new(NodeAddress::new(source), NodeAddress::new(destination), next_hop)
            .with_num_forwards(forwards)
    }

    #[test]
    fn test_looped_packet_dropped() {
        let common = header(5, 9, LOCAL, 2);
        assert_eq!(
            classify(&common, PacketType::Data, LOCAL, 32),
            Verdict::Drop(DropReason::Loop)
        );
    }

    #[test]
    fn test_own_packets_loop_freedom() {
        for forwards in 0..10u16 {
            for next_hop in [LOCAL, NodeAddress::BROADCAST, NodeAddress::new(6)] {
                let common = header(5, 9, next_hop, forwards);
                let verdict = classify(&common, PacketType::Data, LOCAL, 32);
                if forwards == 0 {
                    assert_eq!(verdict, Verdict::Relay);
                } else {
                    assert_eq!(verdict, Verdict::Drop(DropReason::Loop));
                }
            }
        }
    }

    #[test]
    fn test_fresh_own_packet_relayed_whatever_its_next_hop() {
        let common = header(5, 9, NodeAddress::new(6), 0);
        assert_eq!(screen(&common, LOCAL), None);
        assert_eq!(classify(&common, PacketType::Data, LOCAL, 32), Verdict::Relay);

        // Addressed to itself, it is still forwarded rather than delivered
        let to_self = header(5, 5, NodeAddress::new(6), 0);
        assert_eq!(classify(&to_self, PacketType::Data, LOCAL, 32), Verdict::Relay);
    }

    #[test]
    fn test_overheard_traffic_dropped() {
        let common = header(1, 9, NodeAddress::new(6), 1);
        assert_eq!(
            classify(&common, PacketType::Data, LOCAL, 32),
            Verdict::Drop(DropReason::Foreign)
        );
        assert_eq!(screen(&common, LOCAL), Some(DropReason::Foreign));
        assert_eq!(screen(&header(1, 9, NodeAddress::BROADCAST, 1), LOCAL), None);
    }

    #[test]
    fn test_delivery_only_for_data() {
        let common = header(1, 5, LOCAL, 3);
        assert_eq!(classify(&common, PacketType::Data, LOCAL, 32), Verdict::Deliver);
        assert_eq!(classify(&common, PacketType::Ack, LOCAL, 32), Verdict::Relay);
    }

    #[test]
    fn test_hop_limit() {
        assert_eq!(
            classify(&header(1, 9, LOCAL, 4), PacketType::Data, LOCAL, 4),
            Verdict::Drop(DropReason::HopLimit)
        );
        assert_eq!(
            classify(&header(1, 9, LOCAL, 3), PacketType::Data, LOCAL, 4),
            Verdict::Relay
        );
        // Delivery wins over the hop limit at the destination
        assert_eq!(
            classify(&header(1, 5, LOCAL, 4), PacketType::Data, LOCAL, 4),
            Verdict::Deliver
        );
    }

    #[test]
    fn test_stamp_increments_forwards() {
        let common = header(1, 9, LOCAL, 2).with_uid(17);
        let stamped = stamp(&common, NodeAddress::new(8));
        assert_eq!(stamped.next_hop, NodeAddress::new(8));
        assert_eq!(stamped.num_forwards, 3);
        assert_eq!(stamped.source, common.source);
        assert_eq!(stamped.uid, 17);
    }
}
