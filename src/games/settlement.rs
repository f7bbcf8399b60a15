//! Round-end settlement
//!
//! Pays every unsettled bet whose target was reached and forfeits the rest.
//! Credited accounts and the settled round are written in one batch.

use crate::errors::{EngineError, EngineResult};
use crate::game_store::{self, RoundRecord};
use crate::games::ledger::BetLedger;
use crate::games::round::Round;
use crate::games::types::{Phase, PlayerAccount};
use crate::storage::KvBackend;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Summary of one settlement pass
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SettlementReport {
    pub round_number: u64,
    pub crash_multiplier: f64,
    pub winners: usize,
    pub losers: usize,
    pub total_staked: f64,
    pub total_paid: f64,
    /// Entries left unsettled because their player could not be loaded
    pub failures: usize,
}

impl SettlementReport {
    /// Stakes kept minus winnings paid, over the entries this pass processed
    pub fn net_house_delta(&self) -> f64 {
        self.total_staked - self.total_paid
    }

    pub fn processed(&self) -> usize {
        self.winners + self.losers
    }
}

/// Settle a crashed round in place and persist the result.
///
/// Callers pass copies and keep them only if this returns `Ok`. A second pass
/// over the same ledger credits nothing.
pub fn settle_round(
    round: &mut Round,
    ledger: &mut BetLedger,
    store: &dyn KvBackend,
) -> EngineResult<SettlementReport> {
    if round.phase != Phase::Crashed {
        return Err(EngineError::InvalidPhase {
            expected: Phase::Crashed,
            actual: round.phase,
        });
    }
    let crash = round.crash_multiplier.ok_or_else(|| {
        EngineError::NotFound(format!("crash value of round {}", round.round_number))
    })?;

    let mut report = SettlementReport {
        round_number: round.round_number,
        crash_multiplier: crash,
        ..Default::default()
    };
    let mut credited: Vec<PlayerAccount> = Vec::new();

    for entry in ledger.entries_mut().filter(|e| !e.settled) {
        if entry.payout_multiplier > crash {
            entry.settled = true;
            entry.payout = Some(0.0);
            report.losers += 1;
            report.total_staked += entry.bet_amount;
            debug!(user_id = %entry.user_id, stake = entry.bet_amount, "Bet forfeited");
            continue;
        }

        let mut player = match game_store::load_player(store, &entry.user_id) {
            Ok(Some(player)) => player,
            Ok(None) => {
                warn!(user_id = %entry.user_id, round = report.round_number, "Winning bet has no player record");
                entry.settlement_failed = true;
                report.failures += 1;
                continue;
            }
            Err(e) => {
                warn!(user_id = %entry.user_id, round = report.round_number, error = %e, "Failed to load winning player");
                entry.settlement_failed = true;
                report.failures += 1;
                continue;
            }
        };

        let payout = entry.bet_amount * entry.payout_multiplier;
        player.balance += payout;
        credited.push(player);

        entry.settled = true;
        entry.settlement_failed = false;
        entry.cashout_multiplier = Some(entry.payout_multiplier);
        entry.payout = Some(payout);
        report.winners += 1;
        report.total_staked += entry.bet_amount;
        report.total_paid += payout;
    }

    round.active_players.clear();

    let record = RoundRecord {
        round: round.clone(),
        bets: ledger.entries().to_vec(),
    };
    game_store::store_round_with_players(store, &record, &credited)?;

    info!(
        round = report.round_number,
        crash = report.crash_multiplier,
        winners = report.winners,
        losers = report.losers,
        failures = report.failures,
        house_delta = report.net_house_delta(),
        "Round settled"
    );

    Ok(report)
}
