//! AquaMesh Simulator
//!
//! Deterministic discrete-event harness for CARP. The [`Simulator`] owns one
//! [`CarpRouter`](aquamesh_routing::CarpRouter) per node and plays both the
//! scheduler and the acoustic medium for them:
//!
//! - a single event queue ordered by (time, sequence), so events scheduled
//!   for the same instant run in the order they were scheduled
//! - a broadcast medium where every transmission reaches every neighbor in
//!   range after the link's propagation delay
//! - per-link loss drawn from a seeded generator, so a seed fully determines
//!   a run
//!
//! Scenarios are described by [`ScenarioConfig`] and can be loaded from YAML.

pub mod config;
pub mod event;
pub mod logging;
pub mod metrics;
pub mod sim;
pub mod topology;

pub use config::{LinkConfig, NodeConfig, ScenarioConfig, TrafficConfig};
pub use event::{Event, ScenarioAction, ScheduledEvent, SequenceNumber};
pub use logging::init_logging;
pub use metrics::{NodeMetrics, SimMetrics, SimulationResult};
pub use sim::Simulator;
pub use topology::{Link, Topology, SOUND_SPEED};

use anyhow::Result;
use tracing::info;

/// Build a scenario and run it for its configured duration
pub fn run_scenario(scenario: &ScenarioConfig) -> Result<SimulationResult> {
    init_logging(&scenario.log_level);

    let mut sim = Simulator::from_scenario(scenario)?;
    let result = sim.run_for(scenario.duration());

    info!(
        "Scenario finished at {:?}: {} originated, {} delivered, {} frames lost",
        result.end_time,
        result.packets_originated(),
        result.metrics.total_delivered(),
        result.metrics.frames_lost
    );
    Ok(result)
}
