//! Channel-aware relay router
//!
//! One `CarpRouter` per node owns the neighbor table, the discovery flood state,
//! every probe round and the packets waiting for a relay. It is driven entirely
//! from outside: received packets go to [`CarpRouter::on_receive`], timer
//! callbacks to [`CarpRouter::on_timer`], and application traffic to
//! [`CarpRouter::send_data`]. Every entry point takes the [`Environment`]
//! through which the router schedules timers and hands packets on.
//!
//! Every packet is laid out as `[CommonHeader][RelayControlHeader][inner][payload]`
//! and dispatched on the relay control packet type.

use aquamesh_protocol::{
    CommonHeader, DiscoveryHeader, NodeAddress, Packet, PacketType, ProbeReplyHeader,
    ProbeRequestHeader, RelayControlHeader,
};
use lru::LruCache;
use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::config::{CarpConfig, SelectionPolicy};
use crate::discovery::{Announcement, DiscoveryEngine, DiscoveryState, UNKNOWN_HOP_COUNT};
use crate::env::{Environment, TimerEvent};
use crate::error::{Result, RoutingError};
use crate::forwarding::{self, DropReason, Verdict};
use crate::neighbor::NeighborTable;
use crate::probe::{ProbeEngine, ProbeOutcome, RoundId};

/// Router statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RouterStats {
    pub packets_originated: u64,
    pub packets_relayed: u64,
    pub packets_delivered: u64,
    pub dropped_loop: u64,
    pub dropped_foreign: u64,
    pub dropped_hop_limit: u64,
    pub dropped_duplicate: u64,
    pub dropped_malformed: u64,
    pub dropped_no_relay: u64,
    pub dropped_queue_full: u64,
    pub probes_sent: u64,
    pub probe_replies_sent: u64,
    pub probe_acks_received: u64,
    pub probe_acks_ignored: u64,
    pub probe_rounds_completed: u64,
    pub stale_rounds: u64,
    pub discovery_broadcasts: u64,
}

/// Observable routing outcomes, drained with [`CarpRouter::drain_events`]
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingEvent {
    RelaySelected {
        destination: NodeAddress,
        next_hop: NodeAddress,
        link_quality: f64,
        round: RoundId,
    },
    NoRelayAvailable {
        destination: NodeAddress,
        dropped: usize,
    },
    Delivered {
        source: NodeAddress,
        uid: u32,
        hops: u16,
    },
    DiscoveryWindowClosed {
        generation: u64,
        neighbors: usize,
    },
}

/// A cached relay choice
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Route {
    pub next_hop: NodeAddress,
    pub link_quality: f64,
    pub selected_at: Duration,
}

/// A data packet with its routing headers detached
#[derive(Debug)]
struct PendingPacket {
    common: CommonHeader,
    control: RelayControlHeader,
    packet: Packet,
}

pub struct CarpRouter {
    local: NodeAddress,
    config: CarpConfig,
    neighbors: NeighborTable,
    discovery: DiscoveryEngine,
    probe: ProbeEngine,

    /// Relay per destination (per-flow selection only)
    routes: HashMap<NodeAddress, Route>,

    /// Data waiting for a probe round to finish
    pending: HashMap<NodeAddress, VecDeque<PendingPacket>>,

    /// Latest probe reply from each neighbor
    reports: HashMap<NodeAddress, ProbeReplyHeader>,

    /// (source, uid) of packets already handed to the application
    delivered: LruCache<(NodeAddress, u32), ()>,

    last_link_quality: f64,
    next_uid: u32,
    stats: RouterStats,
    events: Vec<RoutingEvent>,
}

impl CarpRouter {
    /// Create a router for `local`
    pub fn new(local: NodeAddress, config: CarpConfig) -> Result<Self> {
        config.validate()?;

        let delivered_capacity =
            NonZeroUsize::new(config.forwarding.delivered_cache_size).unwrap_or(NonZeroUsize::MIN);

        Ok(CarpRouter {
            local,
            neighbors: NeighborTable::new(),
            discovery: DiscoveryEngine::new(local, config.discovery.clone()),
            probe: ProbeEngine::new(local, config.probe.clone()),
            routes: HashMap::new(),
            pending: HashMap::new(),
            reports: HashMap::new(),
            delivered: LruCache::new(delivered_capacity),
            last_link_quality: 0.0,
            next_uid: 1,
            stats: RouterStats::default(),
            events: Vec::new(),
            config,
        })
    }

    pub fn local_address(&self) -> NodeAddress {
        self.local
    }

    pub fn config(&self) -> &CarpConfig {
        &self.config
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    /// Distance from the discovery origin, once discovery has reached this node
    pub fn hop_count(&self) -> Option<u8> {
        self.discovery.own_hop_count()
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        self.discovery.state()
    }

    pub fn route(&self, destination: NodeAddress) -> Option<Route> {
        self.routes.get(&destination).copied()
    }

    /// Latest probe reply received from `neighbor`
    pub fn neighbor_report(&self, neighbor: NodeAddress) -> Option<&ProbeReplyHeader> {
        self.reports.get(&neighbor)
    }

    /// Link quality of the most recently selected relay
    pub fn last_link_quality(&self) -> f64 {
        self.last_link_quality
    }

    pub fn pending_len(&self, destination: NodeAddress) -> usize {
        self.pending.get(&destination).map_or(0, VecDeque::len)
    }

    pub fn pending_total(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    pub fn clear_stats(&mut self) {
        self.stats = RouterStats::default();
    }

    pub fn drain_events(&mut self) -> Vec<RoutingEvent> {
        std::mem::take(&mut self.events)
    }

    /// Forget the relay chosen for `destination`
    pub fn invalidate_route(&mut self, destination: NodeAddress) -> Option<Route> {
        self.routes.remove(&destination)
    }

    pub fn invalidate_all_routes(&mut self) {
        self.routes.clear();
    }

    /// Flood a discovery message with this node as origin
    pub fn start_discovery<E: Environment + ?Sized>(&mut self, env: &mut E) {
        let (announcement, generation) = self.discovery.start();
        self.open_discovery_window(env, announcement, generation);
    }

    /// Originate a data packet towards `destination`
    ///
    /// Returns the packet uid. The packet is sent immediately when a relay is
    /// cached, otherwise it waits for a probe round.
    pub fn send_data<E: Environment + ?Sized>(
        &mut self,
        env: &mut E,
        destination: NodeAddress,
        payload: Vec<u8>,
    ) -> Result<u32> {
        let packet = Packet::new(payload)?;
        let uid = self.next_uid;
        self.next_uid = self.next_uid.wrapping_add(1);

        let common =
            CommonHeader::new(self.local, destination, NodeAddress::BROADCAST).with_uid(uid);
        let control = RelayControlHeader::new(PacketType::Data, self.local, destination);
        self.stats.packets_originated += 1;

        if destination == self.local {
            self.deliver(env, common, packet);
            return Ok(uid);
        }

        debug!("Node {} originating packet {} for {}", self.local, uid, destination);
        self.route_data(
            env,
            PendingPacket {
                common,
                control,
                packet,
            },
        )?;
        Ok(uid)
    }

    /// Run a new relay selection for `destination`, discarding any round in progress
    pub fn reselect_relay<E: Environment + ?Sized>(
        &mut self,
        env: &mut E,
        destination: NodeAddress,
    ) -> Result<RoundId> {
        self.routes.remove(&destination);
        self.start_round(env, destination)
    }

    /// Handle a packet received from the link layer
    pub fn on_receive<E: Environment + ?Sized>(&mut self, env: &mut E, mut packet: Packet) {
        let (common, control) = match pop_routing_headers(&mut packet) {
            Ok(headers) => headers,
            Err(e) => {
                debug!("Node {} dropping undecodable packet: {}", self.local, e);
                self.record_drop(DropReason::Malformed);
                return;
            }
        };

        if let Some(reason) = forwarding::screen(&common, self.local) {
            trace!(
                "Node {} dropping {} packet {} from {}: {}",
                self.local,
                control.packet_type,
                common.uid,
                common.source,
                reason
            );
            self.record_drop(reason);
            return;
        }

        match control.packet_type {
            PacketType::Discovery => self.handle_discovery(env, common, packet),
            PacketType::Probe => self.handle_probe(env, common, packet),
            PacketType::Ack => self.handle_ack(common, packet),
            PacketType::Data => self.handle_data(env, common, control, packet),
            PacketType::Unknown(tag) => {
                debug!(
                    "Node {} dropping packet with unknown type {} from {}",
                    self.local, tag, common.source
                );
                self.record_drop(DropReason::Malformed);
            }
        }
    }

    /// Handle a timer previously requested through [`Environment::schedule`]
    pub fn on_timer<E: Environment + ?Sized>(&mut self, env: &mut E, event: TimerEvent) {
        match event {
            TimerEvent::DiscoveryWindowClosed { generation } => {
                if self.discovery.close_window(generation) {
                    info!(
                        "Node {} discovery window {} closed with {} neighbors",
                        self.local,
                        generation,
                        self.neighbors.len()
                    );
                    self.events.push(RoutingEvent::DiscoveryWindowClosed {
                        generation,
                        neighbors: self.neighbors.len(),
                    });
                } else {
                    debug!(
                        "Node {} ignoring stale discovery window {}",
                        self.local, generation
                    );
                }
            }
            TimerEvent::ProbeDeadline { round } => match self.probe.finish_round(round) {
                None => {
                    debug!("Node {} ignoring stale deadline of {}", self.local, round);
                    self.stats.stale_rounds += 1;
                }
                Some(Ok(outcome)) => self.relay_selected(env, round, outcome),
                Some(Err(RoutingError::NoRelayAvailable { destination })) => {
                    self.no_relay(env, destination)
                }
                Some(Err(e)) => warn!("Node {} failed to finish {}: {}", self.local, round, e),
            },
        }
    }

    fn handle_discovery<E: Environment + ?Sized>(
        &mut self,
        env: &mut E,
        common: CommonHeader,
        mut packet: Packet,
    ) {
        let header = match packet.pop_header::<DiscoveryHeader>() {
            Ok(header) => header,
            Err(e) => {
                debug!("Node {} dropping malformed discovery: {}", self.local, e);
                self.record_drop(DropReason::Malformed);
                return;
            }
        };

        let heard = Announcement {
            header,
            sequence: common.uid,
        };
        if let Some(relay) = self
            .discovery
            .on_received(common.source, heard, &mut self.neighbors)
        {
            let delay = self.probe.jitter();
            self.broadcast_discovery(env, relay, delay);
        }
    }

    fn handle_probe<E: Environment + ?Sized>(
        &mut self,
        env: &mut E,
        common: CommonHeader,
        mut packet: Packet,
    ) {
        if let Err(e) = packet.pop_header::<ProbeRequestHeader>() {
            debug!("Node {} dropping malformed probe: {}", self.local, e);
            self.record_drop(DropReason::Malformed);
            return;
        }

        let requester = common.source;
        let reply = ProbeReplyHeader {
            source: self.local,
            destination: requester,
            queue_depth: self.pending_total().min(u8::MAX as usize) as u8,
            residual_energy: self.config.forwarding.residual_energy,
            hop_count: self.discovery.own_hop_count().unwrap_or(UNKNOWN_HOP_COUNT),
            link_quality: self.last_link_quality,
        };

        let mut ack = Packet::empty();
        ack.push_header(&reply);
        ack.push_header(&RelayControlHeader::new(
            PacketType::Ack,
            self.local,
            requester,
        ));
        ack.push_header(&CommonHeader::new(self.local, requester, requester).with_uid(common.uid));

        let delay = self.probe.jitter();
        trace!(
            "Node {} acknowledging probe {} from {}",
            self.local,
            common.uid,
            requester
        );
        env.send_down(ack, requester, delay);
        self.stats.probe_replies_sent += 1;
    }

    fn handle_ack(&mut self, common: CommonHeader, mut packet: Packet) {
        let reply = match packet.pop_header::<ProbeReplyHeader>() {
            Ok(reply) => reply,
            Err(e) => {
                debug!(
                    "Node {} dropping malformed probe reply from {}: {}",
                    self.local, common.source, e
                );
                self.record_drop(DropReason::Malformed);
                return;
            }
        };

        if self.probe.on_ack(RoundId::new(common.uid), common.source) {
            self.stats.probe_acks_received += 1;
            self.reports.insert(common.source, reply);
        } else {
            trace!(
                "Node {} ignoring acknowledgment from {} for round#{}",
                self.local,
                common.source,
                common.uid
            );
            self.stats.probe_acks_ignored += 1;
        }
    }

    fn handle_data<E: Environment + ?Sized>(
        &mut self,
        env: &mut E,
        common: CommonHeader,
        control: RelayControlHeader,
        packet: Packet,
    ) {
        let verdict = forwarding::classify(
            &common,
            control.packet_type,
            self.local,
            self.config.forwarding.max_hops,
        );

        match verdict {
            Verdict::Deliver => self.deliver(env, common, packet),
            Verdict::Relay => {
                let pending = PendingPacket {
                    common,
                    control,
                    packet,
                };
                if let Err(e) = self.route_data(env, pending) {
                    debug!(
                        "Node {} could not relay packet {} from {}: {}",
                        self.local, common.uid, common.source, e
                    );
                }
            }
            Verdict::Drop(reason) => {
                trace!(
                    "Node {} dropping packet {} from {}: {}",
                    self.local,
                    common.uid,
                    common.source,
                    reason
                );
                self.record_drop(reason);
            }
        }
    }

    fn deliver<E: Environment + ?Sized>(&mut self, env: &mut E, common: CommonHeader, packet: Packet) {
        if self.delivered.put((common.source, common.uid), ()).is_some() {
            trace!(
                "Node {} already delivered packet {} from {}",
                self.local,
                common.uid,
                common.source
            );
            self.record_drop(DropReason::Duplicate);
            return;
        }

        info!(
            "Node {} delivered packet {} from {} after {} hops",
            self.local, common.uid, common.source, common.num_forwards
        );
        self.stats.packets_delivered += 1;
        self.events.push(RoutingEvent::Delivered {
            source: common.source,
            uid: common.uid,
            hops: common.num_forwards,
        });
        env.send_up(packet);
    }

    /// Send via the cached relay, or queue and make sure a round is running
    fn route_data<E: Environment + ?Sized>(
        &mut self,
        env: &mut E,
        pending: PendingPacket,
    ) -> Result<()> {
        let destination = pending.common.destination;

        if self.config.forwarding.selection == SelectionPolicy::PerFlow {
            if let Some(route) = self.routes.get(&destination) {
                let next_hop = route.next_hop;
                self.transmit(env, pending, next_hop);
                return Ok(());
            }
        }

        let capacity = self.config.forwarding.max_pending_per_flow;
        let queue = self.pending.entry(destination).or_default();
        if queue.len() >= capacity {
            self.stats.dropped_queue_full += 1;
            return Err(RoutingError::QueueFull {
                destination,
                capacity,
            });
        }
        queue.push_back(pending);

        if !self.probe.is_probing(destination) {
            self.start_round(env, destination)?;
        }
        Ok(())
    }

    /// Relay candidates, closest to the discovery origin first when known
    fn candidates(&self) -> Vec<NodeAddress> {
        if self.config.forwarding.downhill_only {
            if let Some(own) = self.discovery.own_hop_count() {
                let closer = self.neighbors.closer_than(own);
                if !closer.is_empty() {
                    return closer.into_iter().map(|e| e.address).collect();
                }
            }
        }
        self.neighbors.neighbors().iter().map(|e| e.address).collect()
    }

    fn start_round<E: Environment + ?Sized>(
        &mut self,
        env: &mut E,
        destination: NodeAddress,
    ) -> Result<RoundId> {
        let candidates = self.candidates();
        let (round, probes) = match self.probe.start_round(destination, &candidates, env.now()) {
            Ok(started) => started,
            Err(e) => {
                self.no_relay(env, destination);
                return Err(e);
            }
        };

        let train_size = self.config.probe.train_size;
        for probe in probes {
            let mut packet = Packet::empty();
            packet.push_header(&ProbeRequestHeader {
                source: self.local,
                probe_count: train_size,
            });
            packet.push_header(&RelayControlHeader {
                packet_count: train_size,
                ..RelayControlHeader::new(PacketType::Probe, self.local, probe.target)
            });
            packet.push_header(
                &CommonHeader::new(self.local, probe.target, probe.target).with_uid(round.as_u32()),
            );
            env.send_down(packet, probe.target, probe.delay);
            self.stats.probes_sent += 1;
        }

        env.schedule(
            self.config.probe.wait_time(),
            TimerEvent::ProbeDeadline { round },
        );
        Ok(round)
    }

    fn relay_selected<E: Environment + ?Sized>(
        &mut self,
        env: &mut E,
        round: RoundId,
        outcome: ProbeOutcome,
    ) {
        let ProbeOutcome {
            destination,
            next_hop,
            link_quality,
            acked,
            sent,
        } = outcome;

        info!(
            "Node {} selected relay {} towards {} ({}/{} acked, quality {:.4})",
            self.local, next_hop, destination, acked, sent, link_quality
        );

        self.stats.probe_rounds_completed += 1;
        self.last_link_quality = link_quality;
        if self.config.forwarding.selection == SelectionPolicy::PerFlow {
            self.routes.insert(
                destination,
                Route {
                    next_hop,
                    link_quality,
                    selected_at: env.now(),
                },
            );
        }
        self.events.push(RoutingEvent::RelaySelected {
            destination,
            next_hop,
            link_quality,
            round,
        });

        if let Some(queue) = self.pending.remove(&destination) {
            for pending in queue {
                self.transmit(env, pending, next_hop);
            }
        }
    }

    fn no_relay<E: Environment + ?Sized>(&mut self, env: &mut E, destination: NodeAddress) {
        let dropped = self.pending.remove(&destination).map_or(0, |q| q.len());
        self.stats.dropped_no_relay += dropped as u64;

        warn!(
            "Node {} has no relay towards {} ({} packets dropped)",
            self.local, destination, dropped
        );
        self.events.push(RoutingEvent::NoRelayAvailable {
            destination,
            dropped,
        });

        if self.config.forwarding.rediscover_on_no_relay
            && self.discovery.state() == DiscoveryState::Idle
        {
            let (announcement, generation) = self.discovery.refresh();
            self.open_discovery_window(env, announcement, generation);
        }
    }

    fn transmit<E: Environment + ?Sized>(
        &mut self,
        env: &mut E,
        pending: PendingPacket,
        next_hop: NodeAddress,
    ) {
        let PendingPacket {
            common,
            control,
            mut packet,
        } = pending;

        let stamped = forwarding::stamp(&common, next_hop);
        packet.push_header(&RelayControlHeader {
            hop_count: control.hop_count.saturating_add(1),
            ..control
        });
        packet.push_header(&stamped);

        if common.source != self.local {
            self.stats.packets_relayed += 1;
        }
        trace!(
            "Node {} sending packet {} from {} to {}",
            self.local,
            common.uid,
            common.source,
            next_hop
        );
        env.send_down(packet, next_hop, Duration::ZERO);
    }

    fn open_discovery_window<E: Environment + ?Sized>(
        &mut self,
        env: &mut E,
        announcement: Announcement,
        generation: u64,
    ) {
        self.broadcast_discovery(env, announcement, Duration::ZERO);
        env.schedule(
            self.config.discovery.window(),
            TimerEvent::DiscoveryWindowClosed { generation },
        );
    }

    fn broadcast_discovery<E: Environment + ?Sized>(
        &mut self,
        env: &mut E,
        announcement: Announcement,
        delay: Duration,
    ) {
        let mut packet = Packet::empty();
        packet.push_header(&announcement.header);
        packet.push_header(&RelayControlHeader {
            hop_count: announcement.header.hop_count,
            ..RelayControlHeader::new(
                PacketType::Discovery,
                announcement.header.source,
                NodeAddress::BROADCAST,
            )
        });
        packet.push_header(
            &CommonHeader::new(self.local, NodeAddress::BROADCAST, NodeAddress::BROADCAST)
                .with_uid(announcement.sequence),
        );

        env.send_down(packet, NodeAddress::BROADCAST, delay);
        self.stats.discovery_broadcasts += 1;
    }

    fn record_drop(&mut self, reason: DropReason) {
        let counter = match reason {
            DropReason::Loop => &mut self.stats.dropped_loop,
            DropReason::Foreign => &mut self.stats.dropped_foreign,
            DropReason::HopLimit => &mut self.stats.dropped_hop_limit,
            DropReason::Duplicate => &mut self.stats.dropped_duplicate,
            DropReason::Malformed => &mut self.stats.dropped_malformed,
            DropReason::NoRelay => &mut self.stats.dropped_no_relay,
        };
        *counter += 1;
    }
}

fn pop_routing_headers(
    packet: &mut Packet,
) -> aquamesh_protocol::Result<(CommonHeader, RelayControlHeader)> {
    let common = packet.pop_header::<CommonHeader>()?;
    let control = packet.pop_header::<RelayControlHeader>()?;
    Ok((common, control))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{Outbox, Transmission};

    fn addr(n: u16) -> NodeAddress {
        NodeAddress::new(n)
    }

    fn router(n: u16) -> CarpRouter {
        CarpRouter::new(addr(n), CarpConfig::default()).unwrap()
    }

    /// What a receiver gets for a transmission
    fn over_the_air(transmission: &Transmission) -> Packet {
        Packet::from_wire(&transmission.packet.to_wire()).unwrap()
    }

    fn data_packet(source: u16, destination: u16, next_hop: u16, forwards: u16, uid: u32) -> Packet {
        let mut packet = Packet::new(b"payload".to_vec()).unwrap();
        packet.push_header(&RelayControlHeader::new(
            PacketType::Data,
            addr(source),
            addr(destination),
        ));
        packet.push_header(
            &CommonHeader::new(addr(source), addr(destination), addr(next_hop))
                .with_num_forwards(forwards)
                .with_uid(uid),
        );
        Packet::from_wire(&packet.to_wire()).unwrap()
    }

    /// Router `n` having heard discovery relays from `heard` at the given hop counts
    fn router_with_neighbors(n: u16, heard: &[(u16, u8)]) -> CarpRouter {
        let mut router = router(n);
        let mut outbox = Outbox::default();
        for &(neighbor, hop) in heard {
            let mut packet = Packet::empty();
            packet.push_header(&DiscoveryHeader {
                source: addr(200),
                hop_count: hop,
            });
            packet.push_header(&RelayControlHeader::new(
                PacketType::Discovery,
                addr(200),
                NodeAddress::BROADCAST,
            ));
            packet.push_header(&CommonHeader::new(
                addr(neighbor),
                NodeAddress::BROADCAST,
                NodeAddress::BROADCAST,
            ));
            router.on_receive(&mut outbox, Packet::from_wire(&packet.to_wire()).unwrap());
        }
        router
    }

    fn deadline(outbox: &mut Outbox) -> TimerEvent {
        outbox
            .take_timers()
            .into_iter()
            .map(|t| t.event)
            .find(|e| matches!(e, TimerEvent::ProbeDeadline { .. }))
            .unwrap()
    }

    #[test]
    fn test_router_creation() {
        let router = router(1);
        assert_eq!(router.local_address(), addr(1));
        assert_eq!(router.stats(), &RouterStats::default());
        assert!(router.neighbors().is_empty());

        let mut config = CarpConfig::default();
        config.probe.train_size = 0;
        assert!(CarpRouter::new(addr(1), config).is_err());
    }

    #[test]
    fn test_probe_round_selects_best_acker() {
        let mut source = router_with_neighbors(1, &[(11, 0), (12, 0)]);
        let mut n11 = router(11);
        let mut n12 = router(12);
        let mut outbox = Outbox::default();

        source.send_data(&mut outbox, addr(99), b"reading".to_vec()).unwrap();
        let probes = outbox.take_transmissions();
        assert_eq!(probes.len(), 8);
        assert_eq!(source.stats().probes_sent, 8);
        assert_eq!(source.pending_len(addr(99)), 1);
        let deadline = deadline(&mut outbox);

        let mut acks_11 = Outbox::default();
        let mut acks_12 = Outbox::default();
        for probe in &probes {
            if probe.next_hop == addr(11) {
                n11.on_receive(&mut acks_11, over_the_air(probe));
            } else {
                n12.on_receive(&mut acks_12, over_the_air(probe));
            }
        }

        let acks_11 = acks_11.take_transmissions();
        let acks_12 = acks_12.take_transmissions();
        assert_eq!(acks_11.len(), 4);
        assert_eq!(acks_12.len(), 4);

        // 3 of 4 acknowledgments from 11 survive the channel, 1 of 4 from 12
        for ack in acks_11.iter().take(3).chain(acks_12.iter().take(1)) {
            source.on_receive(&mut outbox, over_the_air(ack));
        }
        assert_eq!(source.stats().probe_acks_received, 4);

        source.on_timer(&mut outbox, deadline);

        let sent = outbox.take_transmissions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].next_hop, addr(11));

        let route = source.route(addr(99)).unwrap();
        assert_eq!(route.next_hop, addr(11));
        assert!((route.link_quality - 0.6375).abs() < 1e-12);
        assert_eq!(source.neighbor_report(addr(11)).unwrap().residual_energy, 100.0);

        let events = source.drain_events();
        assert!(matches!(
            events.as_slice(),
            [RoutingEvent::RelaySelected { next_hop, .. }] if *next_hop == addr(11)
        ));

        // The next packet uses the cached relay without probing
        source.send_data(&mut outbox, addr(99), b"again".to_vec()).unwrap();
        let sent = outbox.take_transmissions();
        assert_eq!(sent.len(), 1);
        assert!(outbox.take_timers().is_empty());
    }

    #[test]
    fn test_no_neighbors_is_no_relay() {
        let mut source = router(1);
        let mut outbox = Outbox::default();

        let err = source
            .send_data(&mut outbox, addr(9), b"lost".to_vec())
            .unwrap_err();
        assert!(matches!(err, RoutingError::NoRelayAvailable { .. }));
        assert_eq!(source.stats().dropped_no_relay, 1);
        assert_eq!(source.pending_len(addr(9)), 0);
        assert_eq!(
            source.drain_events(),
            vec![RoutingEvent::NoRelayAvailable {
                destination: addr(9),
                dropped: 1,
            }]
        );

        // A discovery flood is started to find neighbors
        let sent = outbox.take_transmissions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].next_hop, NodeAddress::BROADCAST);
        assert!(matches!(
            source.discovery_state(),
            DiscoveryState::Broadcasting { .. }
        ));
        // ...without claiming to be a discovery origin
        assert_eq!(source.hop_count(), None);
        let mut flood = over_the_air(&sent[0]);
        flood.pop_header::<CommonHeader>().unwrap();
        flood.pop_header::<RelayControlHeader>().unwrap();
        assert_eq!(
            flood.pop_header::<DiscoveryHeader>().unwrap().hop_count,
            UNKNOWN_HOP_COUNT
        );
    }

    #[test]
    fn test_looped_packet_dropped() {
        let mut node = router(5);
        let mut outbox = Outbox::default();

        node.on_receive(&mut outbox, data_packet(5, 9, 5, 2, 1));

        assert!(outbox.is_empty());
        assert_eq!(node.stats().dropped_loop, 1);
        assert_eq!(node.stats().packets_delivered, 0);
        assert_eq!(node.stats().packets_relayed, 0);
    }

    #[test]
    fn test_fresh_own_packet_forwarded() {
        let mut node = router_with_neighbors(5, &[(6, 0)]);
        let mut outbox = Outbox::default();

        node.on_receive(&mut outbox, data_packet(5, 9, 6, 0, 1));

        assert_eq!(node.stats().dropped_foreign, 0);
        assert_eq!(node.stats().dropped_loop, 0);
        assert_eq!(node.pending_len(addr(9)), 1);
        assert!(!outbox.take_transmissions().is_empty());
    }

    #[test]
    fn test_foreign_and_malformed_dropped() {
        let mut node = router(5);
        let mut outbox = Outbox::default();

        node.on_receive(&mut outbox, data_packet(1, 9, 6, 1, 1));
        node.on_receive(&mut outbox, Packet::from_wire(&[0x01, 0x02, 0x03]).unwrap());

        assert!(outbox.is_empty());
        assert_eq!(node.stats().dropped_foreign, 1);
        assert_eq!(node.stats().dropped_malformed, 1);
    }

    #[test]
    fn test_delivery_and_duplicate_suppression() {
        let mut sink = router(9);
        let mut outbox = Outbox::default();

        sink.on_receive(&mut outbox, data_packet(1, 9, 9, 3, 42));
        sink.on_receive(&mut outbox, data_packet(1, 9, 9, 3, 42));

        let delivered = outbox.take_deliveries();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].payload(), b"payload");
        assert_eq!(sink.stats().packets_delivered, 1);
        assert_eq!(sink.stats().dropped_duplicate, 1);
        assert_eq!(
            sink.drain_events(),
            vec![RoutingEvent::Delivered {
                source: addr(1),
                uid: 42,
                hops: 3,
            }]
        );
    }

    #[test]
    fn test_hop_limit_drop() {
        let mut config = CarpConfig::default();
        config.forwarding.max_hops = 3;
        let mut node = CarpRouter::new(addr(5), config).unwrap();
        let mut outbox = Outbox::default();

        node.on_receive(&mut outbox, data_packet(1, 9, 5, 3, 1));
        assert!(outbox.is_empty());
        assert_eq!(node.stats().dropped_hop_limit, 1);
    }

    #[test]
    fn test_relay_increments_forwards() {
        let mut relay = router_with_neighbors(5, &[(6, 0)]);
        let mut outbox = Outbox::default();
        let route_round = relay.reselect_relay(&mut outbox, addr(9)).unwrap();
        outbox.take_transmissions();
        relay.on_timer(&mut outbox, TimerEvent::ProbeDeadline { round: route_round });
        assert_eq!(relay.route(addr(9)).unwrap().next_hop, addr(6));

        relay.on_receive(&mut outbox, data_packet(1, 9, 5, 1, 7));
        let sent = outbox.take_transmissions();
        assert_eq!(sent.len(), 1);

        let mut packet = over_the_air(&sent[0]);
        let common = packet.pop_header::<CommonHeader>().unwrap();
        let control = packet.pop_header::<RelayControlHeader>().unwrap();
        assert_eq!(common.source, addr(1));
        assert_eq!(common.next_hop, addr(6));
        assert_eq!(common.num_forwards, 2);
        assert_eq!(common.uid, 7);
        assert_eq!(control.hop_count, 1);
        assert_eq!(packet.payload(), b"payload");
        assert_eq!(relay.stats().packets_relayed, 1);
    }

    #[test]
    fn test_superseded_round_deadline_is_stale() {
        let mut source = router_with_neighbors(1, &[(2, 0), (3, 0)]);
        let mut outbox = Outbox::default();

        source.send_data(&mut outbox, addr(9), b"x".to_vec()).unwrap();
        let first = deadline(&mut outbox);
        source.reselect_relay(&mut outbox, addr(9)).unwrap();
        let second = deadline(&mut outbox);
        outbox.take_transmissions();

        source.on_timer(&mut outbox, first);
        assert_eq!(source.stats().stale_rounds, 1);
        assert!(outbox.take_transmissions().is_empty());
        assert_eq!(source.pending_len(addr(9)), 1);

        source.on_timer(&mut outbox, second);
        assert_eq!(outbox.take_transmissions().len(), 1);
        assert_eq!(source.pending_len(addr(9)), 0);
    }

    #[test]
    fn test_per_packet_policy_probes_every_batch() {
        let mut config = CarpConfig::default();
        config.forwarding.selection = SelectionPolicy::PerPacket;
        let mut source = CarpRouter::new(addr(1), config).unwrap();
        let mut outbox = Outbox::default();
        let mut discovery = Packet::empty();
        discovery.push_header(&DiscoveryHeader::new(addr(2)));
        discovery.push_header(&RelayControlHeader::new(
            PacketType::Discovery,
            addr(2),
            NodeAddress::BROADCAST,
        ));
        discovery.push_header(&CommonHeader::new(
            addr(2),
            NodeAddress::BROADCAST,
            NodeAddress::BROADCAST,
        ));
        source.on_receive(&mut outbox, discovery);
        outbox.take_transmissions();

        for _ in 0..2 {
            source.send_data(&mut outbox, addr(9), b"x".to_vec()).unwrap();
            let round = deadline(&mut outbox);
            source.on_timer(&mut outbox, round);
            assert!(source.route(addr(9)).is_none());
        }
        assert_eq!(source.stats().probe_rounds_completed, 2);
    }

    #[test]
    fn test_pending_queue_bound() {
        let mut config = CarpConfig::default();
        config.forwarding.max_pending_per_flow = 2;
        let mut source = CarpRouter::new(addr(1), config).unwrap();
        let mut outbox = Outbox::default();
        source.neighbors = router_with_neighbors(1, &[(2, 0)]).neighbors;

        source.send_data(&mut outbox, addr(9), vec![1]).unwrap();
        source.send_data(&mut outbox, addr(9), vec![2]).unwrap();
        let err = source.send_data(&mut outbox, addr(9), vec![3]).unwrap_err();
        assert!(matches!(err, RoutingError::QueueFull { capacity: 2, .. }));
        assert_eq!(source.stats().dropped_queue_full, 1);
    }

    #[test]
    fn test_downhill_candidates() {
        let node = router_with_neighbors(4, &[(3, 1), (5, 3), (6, 1)]);
        assert_eq!(node.hop_count(), Some(2));
        assert_eq!(node.candidates(), vec![addr(3), addr(6)]);

        let mut config = CarpConfig::default();
        config.forwarding.downhill_only = false;
        let mut flat = CarpRouter::new(addr(4), config).unwrap();
        flat.neighbors = node.neighbors.clone();
        assert_eq!(flat.candidates().len(), 3);
    }

    #[test]
    fn test_discovery_window_lifecycle() {
        let mut sink = router(9);
        let mut relay = router(4);
        let mut outbox = Outbox::default();

        sink.start_discovery(&mut outbox);
        let flood = outbox.take_transmissions();
        assert_eq!(flood.len(), 1);
        let window = outbox.take_timers();
        assert_eq!(window.len(), 1);

        let mut relayed = Outbox::default();
        relay.on_receive(&mut relayed, over_the_air(&flood[0]));
        assert_eq!(relay.neighbors().get(addr(9)).unwrap().hop_count, 0);
        assert_eq!(relay.hop_count(), Some(1));

        let rebroadcast = relayed.take_transmissions();
        assert_eq!(rebroadcast.len(), 1);
        let mut packet = over_the_air(&rebroadcast[0]);
        let common = packet.pop_header::<CommonHeader>().unwrap();
        packet.pop_header::<RelayControlHeader>().unwrap();
        let header = packet.pop_header::<DiscoveryHeader>().unwrap();
        assert_eq!(common.source, addr(4));
        assert_eq!(header.source, addr(9));
        assert_eq!(header.hop_count, 1);

        // The sink hears the relay's rebroadcast but does not flood again
        sink.on_receive(&mut outbox, over_the_air(&rebroadcast[0]));
        assert!(outbox.take_transmissions().is_empty());
        assert_eq!(sink.neighbors().get(addr(4)).unwrap().hop_count, 1);

        sink.on_timer(&mut outbox, window[0].event);
        assert_eq!(
            sink.drain_events(),
            vec![RoutingEvent::DiscoveryWindowClosed {
                generation: 1,
                neighbors: 1,
            }]
        );
        assert_eq!(sink.discovery_state(), DiscoveryState::Idle);
    }

    #[test]
    fn test_data_to_self_delivered_locally() {
        let mut node = router(3);
        let mut outbox = Outbox::default();
        let uid = node.send_data(&mut outbox, addr(3), b"me".to_vec()).unwrap();
        assert_eq!(outbox.take_deliveries().len(), 1);
        assert!(outbox.take_transmissions().is_empty());
        assert_eq!(
            node.drain_events(),
            vec![RoutingEvent::Delivered {
                source: addr(3),
                uid,
                hops: 0,
            }]
        );
    }
}
