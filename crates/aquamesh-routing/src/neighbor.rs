//! Neighbor table populated by discovery

use aquamesh_protocol::NodeAddress;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborEntry {
    pub address: NodeAddress,

    /// Smallest distance from the discovery origin this neighbor has advertised
    pub hop_count: u8,
}

/// Neighbors in first-heard order
///
/// Entries are never removed; the hop count of an entry only ever decreases.
#[derive(Debug, Clone, Default)]
pub struct NeighborTable {
    entries: Vec<NeighborEntry>,
    index: HashMap<NodeAddress, usize>,
}

impl NeighborTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a neighbor or lower its hop count. Returns true if the table changed.
    pub fn record_neighbor(&mut self, address: NodeAddress, observed_hop_count: u8) -> bool {
        match self.index.get(&address) {
            Some(&i) => {
                let entry = &mut self.entries[i];
                if observed_hop_count < entry.hop_count {
                    entry.hop_count = observed_hop_count;
                    true
                } else {
                    false
                }
            }
            None => {
                self.index.insert(address, self.entries.len());
                self.entries.push(NeighborEntry {
                    address,
                    hop_count: observed_hop_count,
                });
                true
            }
        }
    }

    pub fn get(&self, address: NodeAddress) -> Option<NeighborEntry> {
        self.index.get(&address).map(|&i| self.entries[i])
    }

    /// All neighbors, in insertion order
    pub fn neighbors(&self) -> &[NeighborEntry] {
        &self.entries
    }

    /// Neighbors strictly closer to the discovery origin than `own_hop_count`
    pub fn closer_than(&self, own_hop_count: u8) -> Vec<NeighborEntry> {
        self.entries
            .iter()
            .filter(|e| e.hop_count < own_hop_count)
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
