//! Event types and ordering for the discrete event simulation.

use std::cmp::Ordering;
use std::time::Duration;

use aquamesh_protocol::NodeAddress;
use aquamesh_routing::TimerEvent;

/// Unique sequence number for deterministic event ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Scenario actions that can be scheduled during simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioAction {
    /// Disable the link between two nodes.
    DisableLink { a: NodeAddress, b: NodeAddress },
    /// Enable the link between two nodes.
    EnableLink { a: NodeAddress, b: NodeAddress },
    /// Set the loss probability of a link.
    SetLossRate {
        a: NodeAddress,
        b: NodeAddress,
        rate: f64,
    },
    /// Forget every cached relay at a node.
    InvalidateRoutes { node: NodeAddress },
}

/// Events in the discrete event simulation.
#[derive(Debug, Clone)]
pub enum Event {
    /// A node puts a frame on the medium.
    Transmit {
        from: NodeAddress,
        next_hop: NodeAddress,
        frame: Vec<u8>,
    },
    /// A frame reaches a node after propagation.
    Reception {
        to: NodeAddress,
        from: NodeAddress,
        frame: Vec<u8>,
    },
    /// A router timer fires.
    Timer { node: NodeAddress, event: TimerEvent },
    /// The application at `from` sends a payload to `to`.
    AppSend {
        from: NodeAddress,
        to: NodeAddress,
        payload: Vec<u8>,
    },
    /// A node floods a discovery message.
    StartDiscovery { node: NodeAddress },
    /// Execute a scenario action.
    Action(ScenarioAction),
}

/// A scheduled event with timestamp and sequence number for ordering.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub time: Duration,
    pub seq: SequenceNumber,
    pub event: Event,
}

impl ScheduledEvent {
    pub fn new(time: Duration, seq: SequenceNumber, event: Event) -> Self {
        Self { time, seq, event }
    }
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap and the earliest event must pop first.
        match other.time.cmp(&self.time) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn discovery(n: u16) -> Event {
        Event::StartDiscovery {
            node: NodeAddress::new(n),
        }
    }

    #[test]
    fn test_event_ordering() {
        let later = ScheduledEvent::new(Duration::from_secs(10), SequenceNumber::new(1), discovery(1));
        let earlier = ScheduledEvent::new(Duration::from_secs(5), SequenceNumber::new(2), discovery(2));

        assert!(earlier > later);
    }

    #[test]
    fn test_same_time_fifo() {
        let mut queue = BinaryHeap::new();
        for seq in 0..5u64 {
            queue.push(ScheduledEvent::new(
                Duration::from_millis(7),
                SequenceNumber::new(seq),
                discovery(seq as u16),
            ));
        }
        queue.push(ScheduledEvent::new(
            Duration::from_millis(3),
            SequenceNumber::new(9),
            discovery(9),
        ));

        let order: Vec<u64> = std::iter::from_fn(|| queue.pop())
            .map(|e| e.seq.value())
            .collect();
        assert_eq!(order, vec![9, 0, 1, 2, 3, 4]);
    }
}
