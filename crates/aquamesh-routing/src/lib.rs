//! AquaMesh channel-aware relay routing
//!
//! This crate implements CARP-style relay selection for underwater acoustic
//! networks:
//! - Discovery flood that tells each node its hop distance from the origin
//! - Probe trains that measure the one-hop delivery ratio to each neighbor
//! - Per-hop forwarding with loop, overhearing and duplicate rejection
//!
//! The [`CarpRouter`] is a plain state machine driven through an
//! [`Environment`]. [`runtime::spawn_node`] runs one on tokio.

pub mod config;
pub mod discovery;
pub mod env;
pub mod error;
pub mod forwarding;
pub mod neighbor;
pub mod probe;
pub mod router;
pub mod runtime;

pub use config::{
    CarpConfig, DiscoveryConfig, ForwardingConfig, ProbeConfig, PsrDivision, SelectionPolicy,
};
pub use discovery::{Announcement, DiscoveryEngine, DiscoveryState, UNKNOWN_HOP_COUNT};
pub use env::{Environment, Outbox, ScheduledTimer, TimerEvent, TimerHandle, Transmission};
pub use error::{Result, RoutingError};
pub use forwarding::{classify, screen, stamp, DropReason, Verdict};
pub use neighbor::{NeighborEntry, NeighborTable};
pub use probe::{
    link_quality, select_best, ProbeEngine, ProbeOutcome, ProbeRound, ProbeSession, RoundId,
    ScheduledProbe,
};
pub use router::{CarpRouter, Route, RouterStats, RoutingEvent};
pub use runtime::{spawn_node, NodeHandle, NodeIo};

/// Default probe train size
pub const DEFAULT_TRAIN_SIZE: u8 = 4;

/// Default smoothing constant applied to the packet success ratio
pub const DEFAULT_ALPHA: f64 = 0.85;
