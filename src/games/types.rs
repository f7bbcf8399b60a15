use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Round phase, cycling BETTING -> RUNNING -> CRASHED -> BETTING
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Betting,
    Running,
    Crashed,
}

impl Phase {
    /// The phase that follows this one in the cycle
    pub fn next(self) -> Phase {
        match self {
            Phase::Betting => Phase::Running,
            Phase::Running => Phase::Crashed,
            Phase::Crashed => Phase::Betting,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Betting => write!(f, "BETTING"),
            Phase::Running => write!(f, "RUNNING"),
            Phase::Crashed => write!(f, "CRASHED"),
        }
    }
}

/// One player's bet in the current round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BettorEntry {
    pub user_id: String,
    pub username: String,
    pub bet_amount: f64,
    /// Target multiplier the bet settles at if the round reaches it
    pub payout_multiplier: f64,
    pub settled: bool,
    /// Multiplier actually paid: the cashout value or the reached target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cashout_multiplier: Option<f64>,
    /// Amount credited back; `Some(0.0)` for a forfeited stake
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout: Option<f64>,
    /// Settlement could not credit this winning bet; it stays unsettled
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub settlement_failed: bool,
}

impl BettorEntry {
    pub fn new(user_id: String, username: String, bet_amount: f64, payout_multiplier: f64) -> Self {
        Self {
            user_id,
            username,
            bet_amount,
            payout_multiplier,
            settled: false,
            cashout_multiplier: None,
            payout: None,
            settlement_failed: false,
        }
    }

    pub fn profit(&self) -> Option<f64> {
        self.payout.map(|p| p - self.bet_amount)
    }
}

/// Persisted player record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerAccount {
    pub user_id: String,
    pub username: String,
    pub balance: f64,
}

/// Row of the broadcast-only live bettor table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveBettorRow {
    pub user_id: String,
    pub username: String,
    pub bet_amount: f64,
    pub cashout_multiplier: Option<f64>,
    pub profit: Option<f64>,
    pub is_live: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub settlement_failed: bool,
}

impl From<&BettorEntry> for LiveBettorRow {
    fn from(entry: &BettorEntry) -> Self {
        Self {
            user_id: entry.user_id.clone(),
            username: entry.username.clone(),
            bet_amount: entry.bet_amount,
            cashout_multiplier: entry.cashout_multiplier,
            profit: entry.profit(),
            is_live: !entry.settled && !entry.settlement_failed,
            settlement_failed: entry.settlement_failed,
        }
    }
}

/// Confirmation echoed back for an admitted bet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetReceipt {
    pub round_number: u64,
    pub user_id: String,
    pub username: String,
    pub bet_amount: f64,
    pub payout_multiplier: f64,
    pub balance_after: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashoutReceipt {
    pub round_number: u64,
    pub user_id: String,
    pub multiplier: f64,
    pub payout: f64,
    pub profit: f64,
    pub balance_after: f64,
}

/// Settled crash value of a finished round
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CrashReveal {
    pub round_number: u64,
    pub crash_multiplier: f64,
}

/// Point-in-time view of the round for status queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundStatus {
    pub round_number: u64,
    pub phase: Phase,
    pub phase_started_at: DateTime<Utc>,
    /// Present only while RUNNING
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_multiplier: Option<f64>,
    /// Present only while CRASHED
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crash_multiplier: Option<f64>,
    pub crash_history: Vec<f64>,
    pub round_id_history: Vec<u64>,
    pub live_bettors: Vec<LiveBettorRow>,
}

/// Result of a state-changing engine call plus the events it produced
#[derive(Debug, Clone)]
pub struct Applied<T> {
    pub receipt: T,
    pub events: Vec<super::events::RoundEvent>,
}
