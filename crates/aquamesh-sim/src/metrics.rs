//! Metrics collection for simulation analysis.

use std::collections::BTreeMap;
use std::time::Duration;

use aquamesh_protocol::NodeAddress;
use aquamesh_routing::{RouterStats, RoutingEvent};

/// Medium and application counters for one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMetrics {
    /// Frames this node put on the medium.
    pub transmissions: u64,
    /// Frames that reached this node.
    pub receptions: u64,
    /// Packets handed to this node's application.
    pub delivered: u64,
    pub delivered_bytes: u64,
    pub relay_selections: u64,
    pub no_relay: u64,
    /// Application sends the router refused.
    pub send_failures: u64,
}

/// Simulation metrics collected over a run.
#[derive(Debug, Clone, Default)]
pub struct SimMetrics {
    /// Frame copies lost on a link.
    pub frames_lost: u64,
    pub nodes: BTreeMap<NodeAddress, NodeMetrics>,
}

impl SimMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, address: NodeAddress) -> NodeMetrics {
        self.nodes.get(&address).cloned().unwrap_or_default()
    }

    pub(crate) fn node_mut(&mut self, address: NodeAddress) -> &mut NodeMetrics {
        self.nodes.entry(address).or_default()
    }

    pub(crate) fn record_event(&mut self, address: NodeAddress, event: &RoutingEvent) {
        let node = self.node_mut(address);
        match event {
            RoutingEvent::RelaySelected { .. } => node.relay_selections += 1,
            RoutingEvent::NoRelayAvailable { .. } => node.no_relay += 1,
            RoutingEvent::Delivered { .. } | RoutingEvent::DiscoveryWindowClosed { .. } => {}
        }
    }

    pub fn total_transmissions(&self) -> u64 {
        self.nodes.values().map(|n| n.transmissions).sum()
    }

    pub fn total_delivered(&self) -> u64 {
        self.nodes.values().map(|n| n.delivered).sum()
    }
}

/// Result of running a simulation.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub end_time: Duration,
    pub metrics: SimMetrics,
    /// Router counters at the end of the run.
    pub router_stats: BTreeMap<NodeAddress, RouterStats>,
    /// Whether the run ended because no events were left.
    pub queue_exhausted: bool,
}

impl SimulationResult {
    pub fn packets_originated(&self) -> u64 {
        self.router_stats.values().map(|s| s.packets_originated).sum()
    }

    /// Delivered packets over originated packets; 0 when nothing was sent.
    pub fn delivery_ratio(&self) -> f64 {
        let originated = self.packets_originated();
        if originated == 0 {
            return 0.0;
        }
        self.metrics.total_delivered() as f64 / originated as f64
    }

    pub fn stats(&self, address: NodeAddress) -> Option<&RouterStats> {
        self.router_stats.get(&address)
    }
}
