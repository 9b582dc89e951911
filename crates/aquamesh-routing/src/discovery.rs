//! Controlled discovery flood
//!
//! The originator broadcasts a [`DiscoveryHeader`] with hop count 0. Every
//! receiver records the transmitter as a neighbor at the advertised hop count
//! and re-broadcasts with the hop count incremented and the origin unchanged,
//! so all nodes learn their distance from the originator.
//!
//! Re-broadcasts are bounded by remembering each (origin, sequence) flood with
//! the best hop count seen: a node re-broadcasts the first copy and any copy
//! that strictly improves its distance, and never past the configured hop limit.

use aquamesh_protocol::{DiscoveryHeader, NodeAddress};
use lru::LruCache;
use std::num::NonZeroUsize;
use tracing::{debug, trace};

use crate::config::DiscoveryConfig;
use crate::neighbor::NeighborTable;

/// Hop count announced by a node that does not know its distance
pub const UNKNOWN_HOP_COUNT: u8 = u8::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Idle,
    /// A window opened by this node is running
    Broadcasting { generation: u64 },
}

/// A discovery header together with the flood it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Announcement {
    pub header: DiscoveryHeader,
    pub sequence: u32,
}

pub struct DiscoveryEngine {
    local: NodeAddress,
    config: DiscoveryConfig,
    state: DiscoveryState,
    generation: u64,
    next_sequence: u32,
    own_hop_count: Option<u8>,
    seen: LruCache<(NodeAddress, u32), u8>,
}

impl DiscoveryEngine {
    pub fn new(local: NodeAddress, config: DiscoveryConfig) -> Self {
        let capacity = NonZeroUsize::new(config.seen_cache_size).unwrap_or(NonZeroUsize::MIN);
        DiscoveryEngine {
            local,
            config,
            state: DiscoveryState::Idle,
            generation: 0,
            next_sequence: 0,
            own_hop_count: None,
            seen: LruCache::new(capacity),
        }
    }

    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    /// Distance of this node from the discovery origin, if known
    pub fn own_hop_count(&self) -> Option<u8> {
        self.own_hop_count
    }

    /// Open a new window with this node as origin, announced at hop 0
    ///
    /// Returns the announcement to broadcast and the window generation. Any
    /// window still open is superseded and its close event becomes stale.
    pub fn start(&mut self) -> (Announcement, u64) {
        self.own_hop_count = Some(0);
        self.open_window(0)
    }

    /// Open a window to (re)learn neighbors without claiming to be an origin
    ///
    /// The announcement carries the known distance, or [`UNKNOWN_HOP_COUNT`]
    /// which receivers record but never relay or adopt.
    pub fn refresh(&mut self) -> (Announcement, u64) {
        let hop_count = self.own_hop_count.unwrap_or(UNKNOWN_HOP_COUNT);
        self.open_window(hop_count)
    }

    fn open_window(&mut self, hop_count: u8) -> (Announcement, u64) {
        self.generation += 1;
        self.state = DiscoveryState::Broadcasting {
            generation: self.generation,
        };

        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.seen.put((self.local, sequence), hop_count);

        debug!(
            "Node {} starting discovery at hop {} (generation {}, sequence {})",
            self.local, hop_count, self.generation, sequence
        );

        (
            Announcement {
                header: DiscoveryHeader {
                    source: self.local,
                    hop_count,
                },
                sequence,
            },
            self.generation,
        )
    }

    /// Close the window of `generation`. Returns false if the event is stale.
    pub fn close_window(&mut self, generation: u64) -> bool {
        match self.state {
            DiscoveryState::Broadcasting { generation: current } if current == generation => {
                self.state = DiscoveryState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Handle a discovery header heard from `transmitter`
    ///
    /// Returns the announcement to re-broadcast, if any.
    pub fn on_received(
        &mut self,
        transmitter: NodeAddress,
        announcement: Announcement,
        neighbors: &mut NeighborTable,
    ) -> Option<Announcement> {
        let Announcement { header, sequence } = announcement;

        if transmitter == self.local {
            return None;
        }

        neighbors.record_neighbor(transmitter, header.hop_count);

        if header.source == self.local {
            trace!("Node {} heard its own discovery flood from {}", self.local, transmitter);
            return None;
        }
        if header.hop_count == UNKNOWN_HOP_COUNT {
            trace!("Node {} learned {} at unknown distance", self.local, transmitter);
            return None;
        }

        let forwarded = header.next_hop();
        self.own_hop_count = Some(match self.own_hop_count {
            Some(current) => current.min(forwarded.hop_count),
            None => forwarded.hop_count,
        });

        let key = (header.source, sequence);
        if let Some(&best) = self.seen.get(&key) {
            if forwarded.hop_count >= best {
                trace!(
                    "Node {} suppressing discovery {}:{} at hop {} (best {})",
                    self.local,
                    header.source,
                    sequence,
                    forwarded.hop_count,
                    best
                );
                return None;
            }
        }
        self.seen.put(key, forwarded.hop_count);

        if forwarded.hop_count > self.config.max_hops {
            trace!(
                "Node {} not relaying discovery {}:{} past hop limit",
                self.local,
                header.source,
                sequence
            );
            return None;
        }

        Some(Announcement {
            header: forwarded,
            sequence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aquamesh_protocol::Header;

    fn addr(n: u16) -> NodeAddress {
        NodeAddress::new(n)
    }

    fn engine(n: u16) -> DiscoveryEngine {
        DiscoveryEngine::new(addr(n), DiscoveryConfig::default())
    }

    #[test]
    fn test_three_hops_keep_origin() {
        let origin = DiscoveryHeader::from_bytes(&DiscoveryHeader::new(addr(7)).to_bytes()).unwrap();
        let mut current = Announcement {
            header: origin,
            sequence: 0,
        };
        let mut transmitter = addr(7);

        for n in 1..=3u16 {
            let mut table = NeighborTable::new();
            let mut node = engine(n);
            current = node.on_received(transmitter, current, &mut table).unwrap();
            assert_eq!(table.get(transmitter).unwrap().hop_count, (n - 1) as u8);
            assert_eq!(node.own_hop_count(), Some(n as u8));
            transmitter = addr(n);
        }

        assert_eq!(current.header.hop_count, 3);
        assert_eq!(current.header.source, addr(7));
    }

    #[test]
    fn test_duplicates_suppressed_improvements_relayed() {
        let mut node = engine(2);
        let mut table = NeighborTable::new();
        let far = Announcement {
            header: DiscoveryHeader {
                source: addr(9),
                hop_count: 4,
            },
            sequence: 1,
        };

        assert!(node.on_received(addr(5), far, &mut table).is_some());
        assert!(node.on_received(addr(6), far, &mut table).is_none());

        let near = Announcement {
            header: DiscoveryHeader {
                source: addr(9),
                hop_count: 1,
            },
            sequence: 1,
        };
        let relayed = node.on_received(addr(3), near, &mut table).unwrap();
        assert_eq!(relayed.header.hop_count, 2);
        assert_eq!(node.own_hop_count(), Some(2));

        // A new flood from the same origin is relayed again
        let next_round = Announcement { sequence: 2, ..far };
        assert!(node.on_received(addr(5), next_round, &mut table).is_some());
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_hop_limit_stops_flood() {
        let config = DiscoveryConfig {
            max_hops: 2,
            ..Default::default()
        };
        let mut node = DiscoveryEngine::new(addr(1), config);
        let mut table = NeighborTable::new();
        let announcement = Announcement {
            header: DiscoveryHeader {
                source: addr(9),
                hop_count: 2,
            },
            sequence: 0,
        };
        assert!(node.on_received(addr(4), announcement, &mut table).is_none());
        assert_eq!(table.get(addr(4)).unwrap().hop_count, 2);
    }

    #[test]
    fn test_own_flood_not_relayed() {
        let mut node = engine(1);
        let mut table = NeighborTable::new();
        let (announcement, _) = node.start();
        let echoed = Announcement {
            header: announcement.header.next_hop(),
            sequence: announcement.sequence,
        };
        assert!(node.on_received(addr(2), echoed, &mut table).is_none());
        assert_eq!(node.own_hop_count(), Some(0));
        assert_eq!(table.get(addr(2)).unwrap().hop_count, 1);
    }

    #[test]
    fn test_start_always_announces_origin() {
        let mut node = engine(4);
        let mut table = NeighborTable::new();
        let heard = Announcement {
            header: DiscoveryHeader {
                source: addr(9),
                hop_count: 1,
            },
            sequence: 0,
        };
        node.on_received(addr(3), heard, &mut table);
        assert_eq!(node.own_hop_count(), Some(2));

        let (announcement, _) = node.start();
        assert_eq!(announcement.header.source, addr(4));
        assert_eq!(announcement.header.hop_count, 0);
        assert_eq!(node.own_hop_count(), Some(0));
    }

    #[test]
    fn test_refresh_without_distance_stays_local() {
        let mut lost = engine(1);
        let (announcement, _) = lost.refresh();
        assert_eq!(announcement.header.hop_count, UNKNOWN_HOP_COUNT);
        assert_eq!(lost.own_hop_count(), None);
        assert!(matches!(lost.state(), DiscoveryState::Broadcasting { .. }));

        let mut neighbor = engine(2);
        let mut table = NeighborTable::new();
        assert!(neighbor.on_received(addr(1), announcement, &mut table).is_none());
        assert_eq!(table.get(addr(1)).unwrap().hop_count, UNKNOWN_HOP_COUNT);
        assert_eq!(neighbor.own_hop_count(), None);
    }

    #[test]
    fn test_refresh_with_distance() {
        let mut node = engine(4);
        let mut table = NeighborTable::new();
        let heard = Announcement {
            header: DiscoveryHeader {
                source: addr(9),
                hop_count: 0,
            },
            sequence: 0,
        };
        node.on_received(addr(9), heard, &mut table);

        let (announcement, _) = node.refresh();
        assert_eq!(announcement.header.hop_count, 1);
        assert_eq!(node.own_hop_count(), Some(1));
    }

    #[test]
    fn test_restart_makes_old_window_stale() {
        let mut node = engine(1);
        let (_, first) = node.start();
        let (second_announcement, second) = node.start();
        assert_ne!(first, second);
        assert_eq!(second_announcement.sequence, 1);

        assert!(!node.close_window(first));
        assert_eq!(node.state(), DiscoveryState::Broadcasting { generation: second });
        assert!(node.close_window(second));
        assert_eq!(node.state(), DiscoveryState::Idle);
        assert!(!node.close_window(second));
    }
}
