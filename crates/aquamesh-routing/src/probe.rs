//! Probe-based relay selection
//!
//! A round sends a train of probes to every candidate relay, counts the
//! acknowledgments that come back before the deadline and picks the candidate
//! with the most acknowledgments. Each round is keyed by a [`RoundId`] that
//! travels in the probes and their acknowledgments, so rounds for different
//! destinations never share sessions and a superseded round's deadline can be
//! recognized as stale.

use aquamesh_protocol::NodeAddress;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::config::{ProbeConfig, PsrDivision};
use crate::error::{Result, RoutingError};

/// Identifies one probe round on the node that started it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoundId(u32);

impl RoundId {
    pub fn new(id: u32) -> Self {
        RoundId(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round#{}", self.0)
    }
}

/// Probe counters for one candidate relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSession {
    pub target: NodeAddress,
    pub sent: u32,
    pub acked: u32,
}

impl ProbeSession {
    pub fn new(target: NodeAddress) -> Self {
        ProbeSession {
            target,
            sent: 0,
            acked: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeRound {
    pub id: RoundId,
    pub destination: NodeAddress,
    /// Sessions in candidate order
    pub sessions: Vec<ProbeSession>,
    pub started_at: Duration,
    pub deadline: Duration,
}

/// A probe to transmit after `delay`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledProbe {
    pub target: NodeAddress,
    pub delay: Duration,
}

/// Result of a completed round
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeOutcome {
    pub destination: NodeAddress,
    pub next_hop: NodeAddress,
    pub link_quality: f64,
    pub acked: u32,
    pub sent: u32,
}

/// `alpha * acked / sent`, always within `[0, alpha]`
pub fn link_quality(acked: u32, sent: u32, alpha: f64, division: PsrDivision) -> f64 {
    if sent == 0 {
        return 0.0;
    }
    let acked = acked.min(sent);
    let ratio = match division {
        PsrDivision::Real => acked as f64 / sent as f64,
        PsrDivision::Truncating => (acked / sent) as f64,
    };
    alpha * ratio
}

/// Pick the session with the most acknowledgments
///
/// Ties go to the lowest address. If nothing was acknowledged at all, the
/// first session wins.
pub fn select_best(
    destination: NodeAddress,
    sessions: &[ProbeSession],
    alpha: f64,
    division: PsrDivision,
) -> Result<ProbeOutcome> {
    let first = sessions
        .first()
        .ok_or(RoutingError::NoRelayAvailable { destination })?;

    let best = if sessions.iter().all(|s| s.acked == 0) {
        first
    } else {
        sessions
            .iter()
            .max_by(|a, b| a.acked.cmp(&b.acked).then(b.target.cmp(&a.target)))
            .unwrap_or(first)
    };

    Ok(ProbeOutcome {
        destination,
        next_hop: best.target,
        link_quality: link_quality(best.acked, best.sent, alpha, division),
        acked: best.acked,
        sent: best.sent,
    })
}

pub struct ProbeEngine {
    local: NodeAddress,
    config: ProbeConfig,
    rounds: HashMap<RoundId, ProbeRound>,
    /// Live round per destination
    current: HashMap<NodeAddress, RoundId>,
    next_round: u32,
    rng: StdRng,
}

impl ProbeEngine {
    pub fn new(local: NodeAddress, config: ProbeConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed ^ u64::from(local.as_u16()));
        ProbeEngine {
            local,
            config,
            rounds: HashMap::new(),
            current: HashMap::new(),
            next_round: 1,
            rng,
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Random delay in `[0, 0.5 * jitter_unit]`
    pub fn jitter(&mut self) -> Duration {
        let max = self.config.max_jitter().as_micros() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.rng.gen_range(0..=max))
    }

    /// Start a round towards `destination` over `candidates`
    ///
    /// Returns the round id (its deadline is `wait_time` from now) and the
    /// jittered probe train to transmit. A round already running for the same
    /// destination is discarded.
    pub fn start_round(
        &mut self,
        destination: NodeAddress,
        candidates: &[NodeAddress],
        now: Duration,
    ) -> Result<(RoundId, Vec<ScheduledProbe>)> {
        if candidates.is_empty() {
            return Err(RoutingError::NoRelayAvailable { destination });
        }

        let id = RoundId::new(self.next_round);
        self.next_round = self.next_round.wrapping_add(1).max(1);

        if let Some(previous) = self.current.insert(destination, id) {
            self.rounds.remove(&previous);
            debug!(
                "Node {} superseded {} towards {}",
                self.local, previous, destination
            );
        }

        let train = u32::from(self.config.train_size);
        let mut sessions = Vec::with_capacity(candidates.len());
        let mut probes = Vec::with_capacity(candidates.len() * train as usize);

        for &target in candidates {
            let mut session = ProbeSession::new(target);
            for _ in 0..train {
                let delay = self.jitter();
                probes.push(ScheduledProbe { target, delay });
                session.sent += 1;
            }
            sessions.push(session);
        }

        debug!(
            "Node {} started {} towards {} with {} candidates",
            self.local,
            id,
            destination,
            sessions.len()
        );

        self.rounds.insert(
            id,
            ProbeRound {
                id,
                destination,
                sessions,
                started_at: now,
                deadline: now + self.config.wait_time(),
            },
        );

        Ok((id, probes))
    }

    /// Count an acknowledgment from `from` for `round`. Returns false if it was
    /// not counted (unknown or stale round, unknown candidate, or more
    /// acknowledgments than probes).
    pub fn on_ack(&mut self, round: RoundId, from: NodeAddress) -> bool {
        let Some(live) = self.rounds.get_mut(&round) else {
            return false;
        };
        match live.sessions.iter_mut().find(|s| s.target == from) {
            Some(session) if session.acked < session.sent => {
                session.acked += 1;
                true
            }
            _ => false,
        }
    }

    /// Close `round` at its deadline
    ///
    /// Returns `None` for a stale round (superseded or already finished).
    pub fn finish_round(&mut self, round: RoundId) -> Option<Result<ProbeOutcome>> {
        let finished = self.rounds.remove(&round)?;
        if self.current.get(&finished.destination) == Some(&round) {
            self.current.remove(&finished.destination);
        }

        Some(select_best(
            finished.destination,
            &finished.sessions,
            self.config.alpha,
            self.config.psr_division,
        ))
    }

    /// Whether a round towards `destination` is running
    pub fn is_probing(&self, destination: NodeAddress) -> bool {
        self.current.contains_key(&destination)
    }

    pub fn round(&self, round: RoundId) -> Option<&ProbeRound> {
        self.rounds.get(&round)
    }

    pub fn active_rounds(&self) -> usize {
        self.rounds.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u16) -> NodeAddress {
        NodeAddress::new(n)
    }

    fn engine() -> ProbeEngine {
        ProbeEngine::new(addr(1), ProbeConfig::default())
    }

    fn ack_n(engine: &mut ProbeEngine, round: RoundId, from: NodeAddress, n: usize) {
        for _ in 0..n {
            assert!(engine.on_ack(round, from));
        }
    }

    #[test]
    fn test_best_of_two_neighbors() {
        let mut engine = engine();
        let (round, probes) = engine
            .start_round(addr(9), &[addr(11), addr(12)], Duration::ZERO)
            .unwrap();
        assert_eq!(probes.len(), 8);
        assert_eq!(probes.iter().filter(|p| p.target == addr(11)).count(), 4);

        ack_n(&mut engine, round, addr(11), 3);
        ack_n(&mut engine, round, addr(12), 1);

        let outcome = engine.finish_round(round).unwrap().unwrap();
        assert_eq!(outcome.next_hop, addr(11));
        assert_eq!(outcome.acked, 3);
        assert_eq!(outcome.sent, 4);
        assert!((outcome.link_quality - 0.6375).abs() < 1e-12);
    }

    #[test]
    fn test_empty_candidates_is_no_relay() {
        let mut engine = engine();
        let err = engine.start_round(addr(9), &[], Duration::ZERO).unwrap_err();
        assert!(matches!(
            err,
            RoutingError::NoRelayAvailable { destination } if destination == addr(9)
        ));
        assert!(select_best(addr(9), &[], 0.85, PsrDivision::Real).is_err());
        assert!(!engine.is_probing(addr(9)));
    }

    #[test]
    fn test_ties_go_to_lowest_address() {
        let sessions = [
            ProbeSession { target: addr(30), sent: 4, acked: 2 },
            ProbeSession { target: addr(10), sent: 4, acked: 2 },
            ProbeSession { target: addr(20), sent: 4, acked: 1 },
        ];
        let outcome = select_best(addr(1), &sessions, 0.85, PsrDivision::Real).unwrap();
        assert_eq!(outcome.next_hop, addr(10));
    }

    #[test]
    fn test_all_zero_falls_back_to_first_candidate() {
        let sessions = [
            ProbeSession { target: addr(30), sent: 4, acked: 0 },
            ProbeSession { target: addr(10), sent: 4, acked: 0 },
        ];
        let outcome = select_best(addr(1), &sessions, 0.85, PsrDivision::Real).unwrap();
        assert_eq!(outcome.next_hop, addr(30));
        assert_eq!(outcome.link_quality, 0.0);
    }

    #[test]
    fn test_strictly_highest_ack_count_wins() {
        for winner in 0..4u16 {
            let sessions: Vec<_> = (0..4u16)
                .map(|i| ProbeSession {
                    target: addr(100 - i),
                    sent: 4,
                    acked: if i == winner { 4 } else { u32::from(i % 3) },
                })
                .collect();
            let outcome = select_best(addr(1), &sessions, 0.85, PsrDivision::Real).unwrap();
            assert_eq!(outcome.next_hop, addr(100 - winner));
        }
    }

    #[test]
    fn test_link_quality_bounds() {
        for division in [PsrDivision::Real, PsrDivision::Truncating] {
            for sent in 0..6u32 {
                for acked in 0..8u32 {
                    let q = link_quality(acked, sent, 0.85, division);
                    assert!((0.0..=0.85).contains(&q), "{} / {} -> {}", acked, sent, q);
                }
            }
        }
    }

    #[test]
    fn test_truncating_division() {
        assert_eq!(link_quality(3, 4, 0.85, PsrDivision::Truncating), 0.0);
        assert_eq!(link_quality(4, 4, 0.85, PsrDivision::Truncating), 0.85);
    }

    #[test]
    fn test_extra_and_foreign_acks_ignored() {
        let mut engine = engine();
        let (round, _) = engine.start_round(addr(9), &[addr(2)], Duration::ZERO).unwrap();
        ack_n(&mut engine, round, addr(2), 4);
        assert!(!engine.on_ack(round, addr(2)));
        assert!(!engine.on_ack(round, addr(3)));
        assert!(!engine.on_ack(RoundId::new(999), addr(2)));
        assert_eq!(engine.round(round).unwrap().sessions[0].acked, 4);
    }

    #[test]
    fn test_superseded_round_is_stale() {
        let mut engine = engine();
        let (old, _) = engine.start_round(addr(9), &[addr(2)], Duration::ZERO).unwrap();
        let (new, _) = engine
            .start_round(addr(9), &[addr(3)], Duration::from_millis(10))
            .unwrap();
        assert_ne!(old, new);

        assert!(!engine.on_ack(old, addr(2)));
        assert!(engine.finish_round(old).is_none());
        assert!(engine.is_probing(addr(9)));

        let outcome = engine.finish_round(new).unwrap().unwrap();
        assert_eq!(outcome.next_hop, addr(3));
        assert!(!engine.is_probing(addr(9)));
        assert!(engine.finish_round(new).is_none());
    }

    #[test]
    fn test_rounds_for_different_destinations_are_isolated() {
        let mut engine = engine();
        let (a, _) = engine.start_round(addr(8), &[addr(2), addr(3)], Duration::ZERO).unwrap();
        let (b, _) = engine.start_round(addr(9), &[addr(2), addr(3)], Duration::ZERO).unwrap();

        ack_n(&mut engine, a, addr(3), 2);
        ack_n(&mut engine, b, addr(2), 2);

        assert_eq!(engine.finish_round(a).unwrap().unwrap().next_hop, addr(3));
        assert_eq!(engine.finish_round(b).unwrap().unwrap().next_hop, addr(2));
    }

    #[test]
    fn test_jitter_is_bounded_and_seeded() {
        let mut a = engine();
        let mut b = engine();
        for _ in 0..100 {
            let delay = a.jitter();
            assert!(delay <= Duration::from_millis(500));
            assert_eq!(delay, b.jitter());
        }
    }

    #[test]
    fn test_deadline_uses_wait_time() {
        let mut engine = engine();
        let now = Duration::from_secs(5);
        let (round, _) = engine.start_round(addr(9), &[addr(2)], now).unwrap();
        assert_eq!(engine.round(round).unwrap().deadline, now + Duration::from_millis(3000));
    }
}
