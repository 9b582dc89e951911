//! Discrete event simulator for CARP networks.
//!
//! The simulator plays the scheduler and the acoustic medium for a set of
//! [`CarpRouter`]s. Every frame a router sends reaches every node in range of
//! the sender after the link's propagation delay, unless the link loses it;
//! unicast frames are overheard like any other.

use std::collections::{BTreeMap, BinaryHeap};
use std::time::Duration;

use anyhow::{Context, Result};
use aquamesh_protocol::{NodeAddress, Packet};
use aquamesh_routing::{CarpRouter, Outbox, RoutingEvent};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace};

use crate::config::ScenarioConfig;
use crate::event::{Event, ScenarioAction, ScheduledEvent, SequenceNumber};
use crate::metrics::{SimMetrics, SimulationResult};
use crate::topology::Topology;

pub struct Simulator {
    nodes: BTreeMap<NodeAddress, CarpRouter>,
    topology: Topology,
    current_time: Duration,
    event_queue: BinaryHeap<ScheduledEvent>,
    metrics: SimMetrics,
    next_seq: u64,
    /// Decides link losses
    rng: StdRng,
}

impl Simulator {
    pub fn new(seed: u64) -> Self {
        Self {
            nodes: BTreeMap::new(),
            topology: Topology::new(),
            current_time: Duration::ZERO,
            event_queue: BinaryHeap::new(),
            metrics: SimMetrics::new(),
            next_seq: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Build the nodes, links, discovery and traffic of a scenario
    pub fn from_scenario(scenario: &ScenarioConfig) -> Result<Self> {
        scenario.validate()?;

        let mut sim = Simulator::new(scenario.seed).with_topology(scenario.topology());
        for node in &scenario.nodes {
            let mut config = scenario.carp.clone();
            config.probe.seed ^= scenario.seed;
            let router = CarpRouter::new(node.address, config)
                .with_context(|| format!("Failed to create router {}", node.address))?;
            sim.add_node(router);
        }

        sim.schedule(
            Duration::from_millis(scenario.discovery_at_ms),
            Event::StartDiscovery {
                node: scenario.sink,
            },
        );

        for flow in &scenario.traffic {
            for i in 0..flow.count {
                let at = flow.start_ms + u64::from(i) * flow.interval_ms;
                sim.schedule(
                    Duration::from_millis(at),
                    Event::AppSend {
                        from: flow.from,
                        to: flow.to,
                        payload: vec![(i % 256) as u8; flow.payload_size],
                    },
                );
            }
        }

        info!(
            "Scenario ready: {} nodes, {} links, {} flows",
            scenario.nodes.len(),
            sim.topology.link_count(),
            scenario.traffic.len()
        );
        Ok(sim)
    }

    /// Add a router; a router with the same address is replaced
    pub fn add_node(&mut self, router: CarpRouter) {
        self.nodes.insert(router.local_address(), router);
    }

    pub fn node(&self, address: NodeAddress) -> Option<&CarpRouter> {
        self.nodes.get(&address)
    }

    pub fn node_mut(&mut self, address: NodeAddress) -> Option<&mut CarpRouter> {
        self.nodes.get_mut(&address)
    }

    pub fn node_addresses(&self) -> Vec<NodeAddress> {
        self.nodes.keys().copied().collect()
    }

    pub fn current_time(&self) -> Duration {
        self.current_time
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }

    pub fn schedule(&mut self, time: Duration, event: Event) {
        let seq = SequenceNumber::new(self.next_seq);
        self.next_seq += 1;
        self.event_queue.push(ScheduledEvent::new(time, seq, event));
    }

    pub fn schedule_action(&mut self, time: Duration, action: ScenarioAction) {
        self.schedule(time, Event::Action(action));
    }

    /// Process every event up to and including `end_time`
    pub fn run_until(&mut self, end_time: Duration) -> SimulationResult {
        while let Some(next) = self.event_queue.peek() {
            if next.time > end_time {
                break;
            }
            let Some(scheduled) = self.event_queue.pop() else {
                break;
            };
            self.advance_time(scheduled.time);
            self.process_event(scheduled.event);
        }
        self.advance_time(end_time);

        SimulationResult {
            end_time: self.current_time,
            metrics: self.metrics.clone(),
            router_stats: self
                .nodes
                .iter()
                .map(|(address, router)| (*address, router.stats().clone()))
                .collect(),
            queue_exhausted: self.event_queue.is_empty(),
        }
    }

    pub fn run_for(&mut self, duration: Duration) -> SimulationResult {
        self.run_until(self.current_time + duration)
    }

    fn advance_time(&mut self, time: Duration) {
        if time > self.current_time {
            self.current_time = time;
        }
    }

    fn process_event(&mut self, event: Event) {
        match event {
            Event::Transmit {
                from,
                next_hop,
                frame,
            } => self.transmit(from, next_hop, frame),
            Event::Reception { to, from, frame } => self.receive(to, from, frame),
            Event::Timer { node, event } => {
                self.with_router(node, |router, env| router.on_timer(env, event));
            }
            Event::AppSend { from, to, payload } => {
                let result = self.with_router(from, |router, env| router.send_data(env, to, payload));
                if let Some(Err(e)) = result {
                    debug!("Node {} could not send to {}: {}", from, to, e);
                    self.metrics.node_mut(from).send_failures += 1;
                }
            }
            Event::StartDiscovery { node } => {
                self.with_router(node, |router, env| router.start_discovery(env));
            }
            Event::Action(action) => self.execute_action(action),
        }
    }

    /// Put a frame on the medium: one reception per in-range neighbor that
    /// the link does not lose
    fn transmit(&mut self, from: NodeAddress, next_hop: NodeAddress, frame: Vec<u8>) {
        self.metrics.node_mut(from).transmissions += 1;
        trace!(
            "t={:?} node {} transmits {} bytes for {}",
            self.current_time,
            from,
            frame.len(),
            next_hop
        );

        let mut receptions = Vec::new();
        for neighbor in self.topology.neighbors(from) {
            let Some(link) = self.topology.get_link(from, neighbor) else {
                continue;
            };
            let (loss_rate, delay) = (link.loss_rate, link.delay);

            if loss_rate > 0.0 && self.rng.gen::<f64>() < loss_rate {
                trace!("Frame from {} to {} lost", from, neighbor);
                self.metrics.frames_lost += 1;
                continue;
            }
            receptions.push((neighbor, delay));
        }

        let now = self.current_time;
        for (neighbor, delay) in receptions {
            self.schedule(
                now + delay,
                Event::Reception {
                    to: neighbor,
                    from,
                    frame: frame.clone(),
                },
            );
        }
    }

    fn receive(&mut self, to: NodeAddress, from: NodeAddress, frame: Vec<u8>) {
        self.metrics.node_mut(to).receptions += 1;
        match Packet::from_wire(&frame) {
            Ok(packet) => {
                self.with_router(to, |router, env| router.on_receive(env, packet));
            }
            Err(e) => debug!("Node {} discarded frame from {}: {}", to, from, e),
        }
    }

    /// Call into a router, then schedule whatever it asked for
    fn with_router<R>(
        &mut self,
        node: NodeAddress,
        f: impl FnOnce(&mut CarpRouter, &mut Outbox) -> R,
    ) -> Option<R> {
        let mut outbox = Outbox::new(self.current_time);
        let router = self.nodes.get_mut(&node)?;
        let result = f(router, &mut outbox);
        let events = router.drain_events();

        self.collect_outgoing(node, outbox, events);
        Some(result)
    }

    fn collect_outgoing(&mut self, node: NodeAddress, mut outbox: Outbox, events: Vec<RoutingEvent>) {
        let now = self.current_time;

        for timer in outbox.take_timers() {
            self.schedule(
                now + timer.delay,
                Event::Timer {
                    node,
                    event: timer.event,
                },
            );
        }

        for transmission in outbox.take_transmissions() {
            self.schedule(
                now + transmission.delay,
                Event::Transmit {
                    from: node,
                    next_hop: transmission.next_hop,
                    frame: transmission.packet.to_wire(),
                },
            );
        }

        for packet in outbox.take_deliveries() {
            let metrics = self.metrics.node_mut(node);
            metrics.delivered += 1;
            metrics.delivered_bytes += packet.payload().len() as u64;
        }

        for event in &events {
            self.metrics.record_event(node, event);
        }
    }

    fn execute_action(&mut self, action: ScenarioAction) {
        debug!("t={:?} scenario action {:?}", self.current_time, action);
        match action {
            ScenarioAction::DisableLink { a, b } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.active = false;
                }
            }
            ScenarioAction::EnableLink { a, b } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.active = true;
                }
            }
            ScenarioAction::SetLossRate { a, b, rate } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.loss_rate = rate.clamp(0.0, 1.0);
                }
            }
            ScenarioAction::InvalidateRoutes { node } => {
                if let Some(router) = self.nodes.get_mut(&node) {
                    router.invalidate_all_routes();
                }
            }
        }
    }
}
