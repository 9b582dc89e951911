//! Scenario configuration
//!
//! Scenarios are YAML documents. Every field has a default, so a file only
//! needs to name what differs:
//!
//! ```yaml
//! seed: 7
//! sink: 4
//! nodes:
//!   - { address: 1, position: { x: 0.0, y: 0.0, z: 0.0 } }
//!   - { address: 4, position: { x: 10.0, y: 0.0, z: 0.0 } }
//! traffic:
//!   - { from: 1, to: 4, count: 10 }
//! carp:
//!   probe:
//!     wait_time_ms: 2000
//! ```

use anyhow::{bail, Context, Result};
use aquamesh_protocol::{NodeAddress, Position};
use aquamesh_routing::CarpConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::topology::{Link, Topology};

/// Spacing of the reference line deployment, metres
pub const LINE_SPACING: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Seeds the medium's loss generator and every node's jitter generator
    pub seed: u64,

    pub duration_secs: u64,

    /// Default tracing level; `RUST_LOG` takes precedence
    pub log_level: String,

    /// Node that floods the discovery message
    pub sink: NodeAddress,

    /// When the sink starts discovery
    pub discovery_at_ms: u64,

    pub nodes: Vec<NodeConfig>,

    /// Acoustic range used to derive links from positions
    pub range_m: f64,

    /// Loss probability of links derived from positions
    pub loss_rate: f64,

    /// Explicit links; when present, positions are not used for connectivity
    pub links: Vec<LinkConfig>,

    pub traffic: Vec<TrafficConfig>,

    pub carp: CarpConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub address: NodeAddress,
    #[serde(default)]
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub a: NodeAddress,
    pub b: NodeAddress,
    #[serde(default = "default_link_delay_ms")]
    pub delay_ms: u64,
    #[serde(default)]
    pub loss_rate: f64,
}

/// A constant-rate flow from one node to another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficConfig {
    pub from: NodeAddress,
    pub to: NodeAddress,
    #[serde(default = "default_start_ms")]
    pub start_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
}

fn default_link_delay_ms() -> u64 {
    100
}

fn default_start_ms() -> u64 {
    500
}

// 100 byte packets at 500 bit/s
fn default_interval_ms() -> u64 {
    1600
}

fn default_count() -> u32 {
    1
}

fn default_payload_size() -> usize {
    100
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            seed: 0,
            duration_secs: 200,
            log_level: "info".to_string(),
            sink: NodeAddress::new(1),
            discovery_at_ms: 0,
            nodes: Vec::new(),
            range_m: LINE_SPACING * 1.5,
            loss_rate: 0.0,
            links: Vec::new(),
            traffic: Vec::new(),
            carp: CarpConfig::default(),
        }
    }
}

impl ScenarioConfig {
    /// Load a scenario from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("Invalid scenario file {}", path.display()))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let scenario: ScenarioConfig =
            serde_yaml::from_str(contents).context("Failed to parse scenario")?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize scenario")
    }

    /// `nodes` sensors spaced along a line with the sink at the far end
    ///
    /// Node 1 sends a 100 byte packet to the sink every 1.6 s from 0.5 s until
    /// the end of the run.
    pub fn line(nodes: u16) -> Self {
        let sink = NodeAddress::new(nodes + 1);
        let members = (1..=nodes + 1)
            .map(|n| NodeConfig {
                address: NodeAddress::new(n),
                position: Position::new(f64::from(n - 1) * LINE_SPACING, 0.0, 0.0),
            })
            .collect();

        let mut scenario = ScenarioConfig {
            sink,
            nodes: members,
            ..Default::default()
        };
        let window = scenario.duration_secs * 1000 - default_start_ms();
        scenario.traffic.push(TrafficConfig {
            from: NodeAddress::new(1),
            to: sink,
            start_ms: default_start_ms(),
            interval_ms: default_interval_ms(),
            count: (window / default_interval_ms()) as u32,
            payload_size: default_payload_size(),
        });
        scenario
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn addresses(&self) -> Vec<NodeAddress> {
        self.nodes.iter().map(|n| n.address).collect()
    }

    /// Reject scenarios that reference unknown nodes or carry an invalid
    /// routing configuration
    pub fn validate(&self) -> Result<()> {
        let addresses = self.addresses();
        let known = |address: &NodeAddress| addresses.contains(address);

        for (i, address) in addresses.iter().enumerate() {
            if address.is_broadcast() {
                bail!("Node address {} is reserved for broadcast", address);
            }
            if addresses[..i].contains(address) {
                bail!("Duplicate node address {}", address);
            }
        }
        if !addresses.is_empty() && !known(&self.sink) {
            bail!("Sink {} is not a node of the scenario", self.sink);
        }
        for link in &self.links {
            if !known(&link.a) || !known(&link.b) {
                bail!("Link {} - {} references an unknown node", link.a, link.b);
            }
            if !(0.0..=1.0).contains(&link.loss_rate) {
                bail!("Link {} - {} loss rate must be within [0, 1]", link.a, link.b);
            }
        }
        for flow in &self.traffic {
            if !known(&flow.from) || !known(&flow.to) {
                bail!("Flow {} -> {} references an unknown node", flow.from, flow.to);
            }
        }
        if !(0.0..=1.0).contains(&self.loss_rate) {
            bail!("Loss rate must be within [0, 1]");
        }

        self.carp
            .validate()
            .context("Invalid routing configuration")?;
        Ok(())
    }

    /// Connectivity: the explicit links if any, otherwise every pair in range
    pub fn topology(&self) -> Topology {
        if self.links.is_empty() {
            let placed: Vec<_> = self.nodes.iter().map(|n| (n.address, n.position)).collect();
            return Topology::from_positions(&placed, self.range_m, self.loss_rate);
        }

        let mut topology = Topology::new();
        for link in &self.links {
            topology.add_link(
                link.a,
                link.b,
                Link::new()
                    .with_delay(Duration::from_millis(link.delay_ms))
                    .with_loss_rate(link.loss_rate),
            );
        }
        topology
    }
}
