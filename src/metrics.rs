//! Game counters collected by the engine and exposed over HTTP

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct GameMetrics {
    start_time: Instant,
    rounds_completed: AtomicU64,
    bets_placed: AtomicU64,
    bets_rejected: AtomicU64,
    cashouts: AtomicU64,
    settlement_failures: AtomicU64,
    transition_failures: AtomicU64,
    totals: Mutex<Totals>,
}

#[derive(Default, Clone, Copy)]
struct Totals {
    wagered: f64,
    paid: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub rounds_completed: u64,
    pub bets_placed: u64,
    pub bets_rejected: u64,
    pub cashouts: u64,
    pub settlement_failures: u64,
    pub transition_failures: u64,
    pub total_wagered: f64,
    pub total_paid: f64,
    pub house_delta: f64,
}

impl Default for GameMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GameMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            rounds_completed: AtomicU64::new(0),
            bets_placed: AtomicU64::new(0),
            bets_rejected: AtomicU64::new(0),
            cashouts: AtomicU64::new(0),
            settlement_failures: AtomicU64::new(0),
            transition_failures: AtomicU64::new(0),
            totals: Mutex::new(Totals::default()),
        }
    }

    fn with_totals(&self, f: impl FnOnce(&mut Totals)) {
        match self.totals.lock() {
            Ok(mut totals) => f(&mut totals),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    pub fn record_bet(&self, amount: f64) {
        self.bets_placed.fetch_add(1, Ordering::Relaxed);
        self.with_totals(|t| t.wagered += amount);
    }

    pub fn record_rejection(&self) {
        self.bets_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cashout(&self, payout: f64) {
        self.cashouts.fetch_add(1, Ordering::Relaxed);
        self.with_totals(|t| t.paid += payout);
    }

    pub fn record_settlement(&self, paid: f64, failures: usize) {
        self.rounds_completed.fetch_add(1, Ordering::Relaxed);
        self.settlement_failures
            .fetch_add(failures as u64, Ordering::Relaxed);
        self.with_totals(|t| t.paid += paid);
    }

    pub fn record_transition_failure(&self) {
        self.transition_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_runtime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let totals = match self.totals.lock() {
            Ok(totals) => *totals,
            Err(poisoned) => *poisoned.into_inner(),
        };

        MetricsSnapshot {
            uptime_secs: self.total_runtime().as_secs(),
            rounds_completed: self.rounds_completed.load(Ordering::Relaxed),
            bets_placed: self.bets_placed.load(Ordering::Relaxed),
            bets_rejected: self.bets_rejected.load(Ordering::Relaxed),
            cashouts: self.cashouts.load(Ordering::Relaxed),
            settlement_failures: self.settlement_failures.load(Ordering::Relaxed),
            transition_failures: self.transition_failures.load(Ordering::Relaxed),
            total_wagered: totals.wagered,
            total_paid: totals.paid,
            house_delta: totals.wagered - totals.paid,
        }
    }
}
