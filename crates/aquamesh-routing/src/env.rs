//! The router's view of the outside world
//!
//! A [`CarpRouter`](crate::CarpRouter) never owns a clock, a timer wheel or a
//! radio. Every call into it is given an [`Environment`] through which it reads
//! the current time, requests one-shot timers and hands packets down to the
//! link layer or up to the application.

use aquamesh_protocol::{NodeAddress, Packet};
use std::mem;
use std::time::Duration;

use crate::probe::RoundId;

/// Timer callbacks handed back to [`CarpRouter::on_timer`](crate::CarpRouter::on_timer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerEvent {
    /// The discovery window opened by the given generation has elapsed
    DiscoveryWindowClosed { generation: u64 },

    /// A probe round reached its deadline
    ProbeDeadline { round: RoundId },
}

/// Opaque handle returned by [`Environment::schedule`]; timers cannot be cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn new(id: u64) -> Self {
        TimerHandle(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

pub trait Environment {
    /// Time elapsed since the start of the session
    fn now(&self) -> Duration;

    /// Request `event` to be delivered after `delay`
    fn schedule(&mut self, delay: Duration, event: TimerEvent) -> TimerHandle;

    /// Hand a packet to the link layer; fire and forget
    fn send_down(&mut self, packet: Packet, next_hop: NodeAddress, delay: Duration);

    /// Deliver a packet to the application
    fn send_up(&mut self, packet: Packet);
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTimer {
    pub handle: TimerHandle,
    pub delay: Duration,
    pub event: TimerEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transmission {
    pub packet: Packet,
    pub next_hop: NodeAddress,
    pub delay: Duration,
}

/// Environment that records every request for the caller to act on
///
/// Drivers (the simulator, the tokio runtime, tests) create one per node, call
/// into the router, then drain the recorded timers, transmissions and
/// deliveries.
#[derive(Debug, Default)]
pub struct Outbox {
    now: Duration,
    next_handle: u64,
    timers: Vec<ScheduledTimer>,
    transmissions: Vec<Transmission>,
    deliveries: Vec<Packet>,
}

impl Outbox {
    pub fn new(now: Duration) -> Self {
        Outbox {
            now,
            ..Default::default()
        }
    }

    pub fn set_now(&mut self, now: Duration) {
        self.now = now;
    }

    pub fn take_timers(&mut self) -> Vec<ScheduledTimer> {
        mem::take(&mut self.timers)
    }

    pub fn take_transmissions(&mut self) -> Vec<Transmission> {
        mem::take(&mut self.transmissions)
    }

    pub fn take_deliveries(&mut self) -> Vec<Packet> {
        mem::take(&mut self.deliveries)
    }

    pub fn timers(&self) -> &[ScheduledTimer] {
        &self.timers
    }

    pub fn transmissions(&self) -> &[Transmission] {
        &self.transmissions
    }

    pub fn deliveries(&self) -> &[Packet] {
        &self.deliveries
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty() && self.transmissions.is_empty() && self.deliveries.is_empty()
    }
}

impl Environment for Outbox {
    fn now(&self) -> Duration {
        self.now
    }

    fn schedule(&mut self, delay: Duration, event: TimerEvent) -> TimerHandle {
        let handle = TimerHandle::new(self.next_handle);
        self.next_handle += 1;
        self.timers.push(ScheduledTimer {
            handle,
            delay,
            event,
        });
        handle
    }

    fn send_down(&mut self, packet: Packet, next_hop: NodeAddress, delay: Duration) {
        self.transmissions.push(Transmission {
            packet,
            next_hop,
            delay,
        });
    }

    fn send_up(&mut self, packet: Packet) {
        self.deliveries.push(packet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbox_records_and_drains() {
        let mut outbox = Outbox::new(Duration::from_secs(2));
        assert_eq!(outbox.now(), Duration::from_secs(2));

        let first = outbox.schedule(
            Duration::from_millis(10),
            TimerEvent::DiscoveryWindowClosed { generation: 1 },
        );
        let second = outbox.schedule(
            Duration::from_millis(20),
            TimerEvent::DiscoveryWindowClosed { generation: 2 },
        );
        assert_ne!(first, second);

        outbox.send_down(Packet::empty(), NodeAddress::BROADCAST, Duration::ZERO);
        outbox.send_up(Packet::empty());
        assert!(!outbox.is_empty());

        assert_eq!(outbox.take_timers().len(), 2);
        assert_eq!(outbox.take_transmissions()[0].next_hop, NodeAddress::BROADCAST);
        assert_eq!(outbox.take_deliveries().len(), 1);
        assert!(outbox.is_empty());
    }
}
