//! Round record and its phase transitions
//!
//! Transitions never mutate in place: each returns the next record so the
//! caller can persist it first and commit only once the write succeeded.

use crate::errors::{EngineError, EngineResult};
use crate::games::types::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// The single current-round record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Round {
    pub round_number: u64,
    pub phase: Phase,
    /// Drawn at RUNNING entry, cleared when the next round opens
    pub crash_multiplier: Option<f64>,
    /// Players holding an admitted bet this round, in admission order
    pub active_players: Vec<String>,
    pub phase_started_at: DateTime<Utc>,
    /// Past crash values, oldest first
    pub crash_history: VecDeque<f64>,
    pub round_id_history: VecDeque<u64>,
}

impl Round {
    /// First round after a fresh bootstrap
    pub fn genesis(now: DateTime<Utc>) -> Self {
        Self {
            round_number: 1,
            phase: Phase::Betting,
            crash_multiplier: None,
            active_players: Vec::new(),
            phase_started_at: now,
            crash_history: VecDeque::new(),
            round_id_history: VecDeque::new(),
        }
    }

    fn expect_phase(&self, expected: Phase) -> EngineResult<()> {
        if self.phase != expected {
            return Err(EngineError::InvalidPhase {
                expected,
                actual: self.phase,
            });
        }
        Ok(())
    }

    pub fn is_active(&self, user_id: &str) -> bool {
        self.active_players.iter().any(|p| p == user_id)
    }

    /// BETTING -> RUNNING with the drawn crash value
    pub fn begin_running(&self, crash_multiplier: f64, now: DateTime<Utc>) -> EngineResult<Round> {
        self.expect_phase(Phase::Betting)?;
        if self.crash_multiplier.is_some() {
            return Err(EngineError::Validation(format!(
                "round {} already has a crash value",
                self.round_number
            )));
        }

        let mut next = self.clone();
        next.phase = self.phase.next();
        next.crash_multiplier = Some(crash_multiplier);
        next.phase_started_at = now;
        Ok(next)
    }

    /// RUNNING -> CRASHED
    pub fn crash(&self, now: DateTime<Utc>) -> EngineResult<Round> {
        self.expect_phase(Phase::Running)?;

        let mut next = self.clone();
        next.phase = self.phase.next();
        next.phase_started_at = now;
        Ok(next)
    }

    /// CRASHED -> BETTING of the following round, folding this one into history
    pub fn open_next(&self, history_len: usize, now: DateTime<Utc>) -> EngineResult<Round> {
        self.expect_phase(Phase::Crashed)?;
        let crash = self.crash_multiplier.ok_or_else(|| {
            EngineError::NotFound(format!("crash value of round {}", self.round_number))
        })?;

        let mut next = self.clone();
        push_bounded(&mut next.crash_history, crash, history_len);
        push_bounded(&mut next.round_id_history, self.round_number, history_len);
        next.round_number += 1;
        next.phase = self.phase.next();
        next.crash_multiplier = None;
        next.active_players.clear();
        next.phase_started_at = now;
        Ok(next)
    }
}

fn push_bounded<T>(history: &mut VecDeque<T>, value: T, bound: usize) {
    history.push_back(value);
    while history.len() > bound {
        history.pop_front();
    }
}

/// Exponential multiplier growth: `m(t) = e^(rate * t)`
#[derive(Debug, Clone, Copy)]
pub struct MultiplierCurve {
    growth_rate: f64,
}

impl MultiplierCurve {
    pub fn new(growth_rate: f64) -> Self {
        Self { growth_rate }
    }

    pub fn at(&self, elapsed: Duration) -> f64 {
        (self.growth_rate * elapsed.as_secs_f64()).exp()
    }

    /// Time the curve needs to reach `multiplier`
    pub fn time_to_reach(&self, multiplier: f64) -> Duration {
        if multiplier <= 1.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(multiplier.ln() / self.growth_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_round(crash: f64) -> Round {
        Round::genesis(Utc::now())
            .begin_running(crash, Utc::now())
            .unwrap()
    }

    #[test]
    fn test_phase_cycle() {
        let round = Round::genesis(Utc::now());
        assert_eq!(round.phase, Phase::Betting);

        let running = round.begin_running(2.5, Utc::now()).unwrap();
        assert_eq!(running.phase, Phase::Running);
        assert_eq!(running.crash_multiplier, Some(2.5));

        let crashed = running.crash(Utc::now()).unwrap();
        assert_eq!(crashed.phase, Phase::Crashed);
        assert_eq!(crashed.crash_multiplier, Some(2.5));

        let next = crashed.open_next(25, Utc::now()).unwrap();
        assert_eq!(next.phase, Phase::Betting);
        assert_eq!(next.round_number, 2);
        assert_eq!(next.crash_multiplier, None);
        assert_eq!(next.crash_history, VecDeque::from(vec![2.5]));
        assert_eq!(next.round_id_history, VecDeque::from(vec![1]));
    }

    #[test]
    fn test_transitions_reject_wrong_phase() {
        let round = Round::genesis(Utc::now());
        assert!(matches!(
            round.crash(Utc::now()),
            Err(EngineError::InvalidPhase { expected: Phase::Running, actual: Phase::Betting })
        ));
        assert!(round.open_next(25, Utc::now()).is_err());

        let running = running_round(2.0);
        assert!(running.begin_running(3.0, Utc::now()).is_err());
        assert_eq!(running.crash_multiplier, Some(2.0));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut round = Round::genesis(Utc::now());
        for i in 0..5 {
            round = round
                .begin_running(1.0 + i as f64, Utc::now())
                .and_then(|r| r.crash(Utc::now()))
                .and_then(|r| r.open_next(3, Utc::now()))
                .unwrap();
        }

        assert_eq!(round.round_number, 6);
        assert_eq!(round.crash_history, VecDeque::from(vec![3.0, 4.0, 5.0]));
        assert_eq!(round.round_id_history, VecDeque::from(vec![3, 4, 5]));
    }

    #[test]
    fn test_open_next_clears_players() {
        let mut round = Round::genesis(Utc::now());
        round.active_players.push("alice".to_string());
        let crashed = round
            .begin_running(2.0, Utc::now())
            .and_then(|r| r.crash(Utc::now()))
            .unwrap();
        assert!(crashed.is_active("alice"));

        let next = crashed.open_next(25, Utc::now()).unwrap();
        assert!(next.active_players.is_empty());
    }

    #[test]
    fn test_multiplier_curve() {
        let curve = MultiplierCurve::new(0.07);
        assert_eq!(curve.at(Duration::ZERO), 1.0);
        assert!(curve.at(Duration::from_secs(5)) < curve.at(Duration::from_secs(6)));

        let t = curve.time_to_reach(2.0);
        assert!((curve.at(t) - 2.0).abs() < 1e-9);
        assert_eq!(curve.time_to_reach(1.0), Duration::ZERO);
    }
}
