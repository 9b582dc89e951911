//! Acoustic links between simulated nodes.

use std::collections::BTreeMap;
use std::time::Duration;

use aquamesh_protocol::{NodeAddress, Position};

/// Speed of sound in sea water, m/s
pub const SOUND_SPEED: f64 = 1500.0;

/// Properties of a link between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    /// Probability that a frame on this link is lost (0.0 to 1.0).
    pub loss_rate: f64,
    /// Propagation delay.
    pub delay: Duration,
    /// Whether the link is currently usable.
    pub active: bool,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            delay: Duration::from_millis(100),
            active: true,
        }
    }
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Symmetric connectivity between nodes.
///
/// Links are kept ordered so that neighbor lists, and with them the order in
/// which the loss generator is consumed, are identical from run to run.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    links: BTreeMap<(NodeAddress, NodeAddress), Link>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each node linked only to its predecessor and successor.
    pub fn chain(nodes: &[NodeAddress], link: Link) -> Self {
        let mut topo = Self::new();
        for window in nodes.windows(2) {
            topo.add_link(window[0], window[1], link.clone());
        }
        topo
    }

    /// Nodes within `range` metres of each other are linked, with propagation
    /// delay derived from their distance.
    pub fn from_positions(nodes: &[(NodeAddress, Position)], range: f64, loss_rate: f64) -> Self {
        let mut topo = Self::new();
        for (i, (a, pa)) in nodes.iter().enumerate() {
            for (b, pb) in nodes.iter().skip(i + 1) {
                let distance = pa.distance(pb);
                if distance <= range {
                    let link = Link::new()
                        .with_loss_rate(loss_rate)
                        .with_delay(Duration::from_secs_f64(distance / SOUND_SPEED));
                    topo.add_link(*a, *b, link);
                }
            }
        }
        topo
    }

    pub fn add_link(&mut self, a: NodeAddress, b: NodeAddress, link: Link) {
        self.links.insert(Self::canonical_pair(a, b), link);
    }

    pub fn get_link(&self, a: NodeAddress, b: NodeAddress) -> Option<&Link> {
        self.links.get(&Self::canonical_pair(a, b))
    }

    pub fn get_link_mut(&mut self, a: NodeAddress, b: NodeAddress) -> Option<&mut Link> {
        self.links.get_mut(&Self::canonical_pair(a, b))
    }

    /// Link exists and is active.
    pub fn is_connected(&self, a: NodeAddress, b: NodeAddress) -> bool {
        self.get_link(a, b).is_some_and(|link| link.active)
    }

    /// Nodes in range of `node` over active links, in address order.
    pub fn neighbors(&self, node: NodeAddress) -> Vec<NodeAddress> {
        let mut result = Vec::new();
        for (&(a, b), link) in &self.links {
            if !link.active {
                continue;
            }
            if a == node {
                result.push(b);
            } else if b == node {
                result.push(a);
            }
        }
        result.sort();
        result
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn set_global_loss_rate(&mut self, rate: f64) {
        let rate = rate.clamp(0.0, 1.0);
        for link in self.links.values_mut() {
            link.loss_rate = rate;
        }
    }

    fn canonical_pair(a: NodeAddress, b: NodeAddress) -> (NodeAddress, NodeAddress) {
        if a < b {
            (a, b)
        } else {
            (b, a)
        }
    }
}
