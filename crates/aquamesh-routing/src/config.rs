//! Router configuration
//!
//! Every tunable of the relay-selection protocol lives here and is passed to
//! [`crate::CarpRouter::new`] at construction. All structs deserialize from a
//! partial document: missing fields fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::discovery::UNKNOWN_HOP_COUNT;
use crate::error::{Result, RoutingError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarpConfig {
    pub discovery: DiscoveryConfig,
    pub probe: ProbeConfig,
    pub forwarding: ForwardingConfig,
}

impl CarpConfig {
    /// Reject configurations the router cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.probe.train_size == 0 {
            return Err(RoutingError::InvalidConfig(
                "probe.train_size must be at least 1".to_string(),
            ));
        }
        if self.probe.wait_time_ms == 0 {
            return Err(RoutingError::InvalidConfig(
                "probe.wait_time_ms must be positive".to_string(),
            ));
        }
        if !(self.probe.alpha > 0.0 && self.probe.alpha <= 1.0) {
            return Err(RoutingError::InvalidConfig(format!(
                "probe.alpha must be in (0, 1], got {}",
                self.probe.alpha
            )));
        }
        if self.discovery.max_hops == 0 || self.forwarding.max_hops == 0 {
            return Err(RoutingError::InvalidConfig(
                "hop limits must be at least 1".to_string(),
            ));
        }
        if self.discovery.max_hops >= UNKNOWN_HOP_COUNT {
            return Err(RoutingError::InvalidConfig(format!(
                "discovery.max_hops must be below {}",
                UNKNOWN_HOP_COUNT
            )));
        }
        if self.discovery.seen_cache_size == 0 {
            return Err(RoutingError::InvalidConfig(
                "discovery.seen_cache_size must be at least 1".to_string(),
            ));
        }
        if self.forwarding.residual_energy < 0.0 {
            return Err(RoutingError::InvalidConfig(
                "forwarding.residual_energy must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// How long the originator keeps its discovery window open
    pub window_ms: u64,

    /// Floods are not re-broadcast beyond this hop count
    pub max_hops: u8,

    /// Number of (origin, sequence) pairs remembered for flood suppression
    pub seen_cache_size: usize,
}

impl DiscoveryConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            window_ms: 1000,
            max_hops: 32,
            seen_cache_size: 256,
        }
    }
}

/// How the packet success ratio `acked / sent` is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PsrDivision {
    /// Real-valued ratio
    #[default]
    Real,
    /// Integer division, so anything short of a full train scores zero
    Truncating,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Probes sent to each candidate per round
    pub train_size: u8,

    /// Time from the start of a round to relay selection
    pub wait_time_ms: u64,

    /// Probe and reply jitter is uniform in `[0, 0.5 * jitter_unit_ms]`
    pub jitter_unit_ms: u64,

    /// Link quality scale: `quality = alpha * acked / sent`
    pub alpha: f64,

    pub psr_division: PsrDivision,

    /// Seed for the jitter generator
    pub seed: u64,
}

impl ProbeConfig {
    pub fn wait_time(&self) -> Duration {
        Duration::from_millis(self.wait_time_ms)
    }

    /// Upper bound of the random send jitter
    pub fn max_jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_unit_ms) / 2
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            train_size: crate::DEFAULT_TRAIN_SIZE,
            wait_time_ms: 3000,
            jitter_unit_ms: 1000,
            alpha: crate::DEFAULT_ALPHA,
            psr_division: PsrDivision::Real,
            seed: 0,
        }
    }
}

/// When a relay-selection round runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Probe once per destination and reuse the relay until invalidated
    #[default]
    PerFlow,
    /// Probe for every batch of packets
    PerPacket,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardingConfig {
    pub selection: SelectionPolicy,

    /// Packets relayed this many times are dropped
    pub max_hops: u16,

    /// Packets buffered per destination while a round is running
    pub max_pending_per_flow: usize,

    /// Only consider neighbors closer to the discovery origin than this node
    pub downhill_only: bool,

    /// Start a new discovery flood when no relay is available
    pub rediscover_on_no_relay: bool,

    /// Residual energy advertised in probe replies
    pub residual_energy: f64,

    /// Remembered (source, uid) pairs for duplicate delivery suppression
    pub delivered_cache_size: usize,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        ForwardingConfig {
            selection: SelectionPolicy::PerFlow,
            max_hops: 32,
            max_pending_per_flow: 64,
            downhill_only: true,
            rediscover_on_no_relay: true,
            residual_energy: 100.0,
            delivered_cache_size: 1024,
        }
    }
}
