//! Round Engine
//!
//! Owns the current round and its bet ledger behind a single async mutex.
//! Every operation (bet, cashout, phase transition with settlement) is one
//! critical section: it validates, persists, commits in memory and returns the
//! events it produced. Nothing here talks to the network.

use crate::config::CrashConfig;
use crate::errors::{EngineError, EngineResult};
use crate::game_store::{self, RoundRecord};
use crate::games::crash_policy::CrashPolicy;
use crate::games::events::RoundEvent;
use crate::games::ledger::{validate_bet, BetLedger};
use crate::games::round::{MultiplierCurve, Round};
use crate::games::settlement::{settle_round, SettlementReport};
use crate::games::types::{
    Applied, BetReceipt, BettorEntry, CashoutReceipt, CrashReveal, Phase, PlayerAccount,
    RoundStatus,
};
use crate::metrics::GameMetrics;
use crate::storage::KvBackend;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
struct RoundTimings {
    betting_window: Duration,
    display_window: Duration,
    history_len: usize,
}

struct EngineState {
    round: Round,
    ledger: BetLedger,
    /// Monotonic start of the current phase
    phase_clock: Instant,
    /// Crash value drawn for a BETTING -> RUNNING transition that has not committed yet
    pending_crash: Option<f64>,
    last_crash: Option<CrashReveal>,
    last_settlement: Option<SettlementReport>,
}

impl EngineState {
    fn record(&self) -> RoundRecord {
        RoundRecord {
            round: self.round.clone(),
            bets: self.ledger.entries().to_vec(),
        }
    }

    fn phase_event(&self) -> RoundEvent {
        RoundEvent::PhaseChanged {
            round_number: self.round.round_number,
            phase: self.round.phase,
            phase_started_at: self.round.phase_started_at,
        }
    }
}

pub struct RoundEngine {
    state: Mutex<EngineState>,
    store: Arc<dyn KvBackend>,
    policy: Arc<dyn CrashPolicy>,
    curve: MultiplierCurve,
    timings: RoundTimings,
    metrics: Arc<GameMetrics>,
}

impl RoundEngine {
    /// Load the current round (or create the first one) and seed configured players.
    ///
    /// A round found RUNNING is crashed and settled immediately; one found
    /// CRASHED keeps its settlement and waits out a fresh display window.
    pub fn bootstrap(
        config: &CrashConfig,
        store: Arc<dyn KvBackend>,
        policy: Arc<dyn CrashPolicy>,
    ) -> EngineResult<Self> {
        for seed in &config.bootstrap.seed_players {
            game_store::ensure_player(
                store.as_ref(),
                &seed.user_id,
                &seed.username,
                config.bootstrap.default_balance,
            )?;
        }

        let now = Utc::now();
        let metrics = Arc::new(GameMetrics::new());
        let mut last_settlement = None;

        let (round, ledger) = match game_store::load_round(store.as_ref())? {
            None => {
                let round = Round::genesis(now);
                game_store::store_round(
                    store.as_ref(),
                    &RoundRecord {
                        round: round.clone(),
                        bets: Vec::new(),
                    },
                )?;
                info!("🎲 Created first round");
                (round, BetLedger::new())
            }
            Some(record) => {
                let mut ledger = BetLedger::from_entries(record.bets);
                let round = match record.round.phase {
                    Phase::Betting | Phase::Crashed => record.round,
                    Phase::Running => {
                        warn!(
                            round = record.round.round_number,
                            "Round was running at shutdown, crashing it now"
                        );
                        let mut crashed = record.round.crash(now)?;
                        let report = settle_round(&mut crashed, &mut ledger, store.as_ref())?;
                        metrics.record_settlement(report.total_paid, report.failures);
                        last_settlement = Some(report);
                        crashed
                    }
                };
                info!(
                    round = round.round_number,
                    phase = %round.phase,
                    bets = ledger.len(),
                    "📂 Restored round from storage"
                );
                (round, ledger)
            }
        };

        let last_crash = match (round.phase, round.crash_multiplier) {
            (Phase::Crashed, Some(crash_multiplier)) => Some(CrashReveal {
                round_number: round.round_number,
                crash_multiplier,
            }),
            _ => round
                .round_id_history
                .back()
                .zip(round.crash_history.back())
                .map(|(&round_number, &crash_multiplier)| CrashReveal {
                    round_number,
                    crash_multiplier,
                }),
        };

        info!(policy = policy.name(), "Crash policy selected");

        Ok(Self {
            state: Mutex::new(EngineState {
                round,
                ledger,
                phase_clock: Instant::now(),
                pending_crash: None,
                last_crash,
                last_settlement,
            }),
            store,
            policy,
            curve: MultiplierCurve::new(config.round.growth_rate),
            timings: RoundTimings {
                betting_window: config.betting_window(),
                display_window: config.display_window(),
                history_len: config.round.history_len,
            },
            metrics,
        })
    }

    pub fn metrics(&self) -> Arc<GameMetrics> {
        self.metrics.clone()
    }

    pub fn curve(&self) -> MultiplierCurve {
        self.curve
    }

    /// Ticking multiplier, clamped to the crash value once reached
    fn running_multiplier(&self, state: &EngineState) -> Option<f64> {
        match (state.round.phase, state.round.crash_multiplier) {
            (Phase::Running, Some(crash)) => {
                Some(self.curve.at(state.phase_clock.elapsed()).min(crash))
            }
            _ => None,
        }
    }

    pub async fn status(&self) -> RoundStatus {
        let state = self.state.lock().await;
        RoundStatus {
            round_number: state.round.round_number,
            phase: state.round.phase,
            phase_started_at: state.round.phase_started_at,
            current_multiplier: self.running_multiplier(&state),
            crash_multiplier: match state.round.phase {
                Phase::Crashed => state.round.crash_multiplier,
                _ => None,
            },
            crash_history: state.round.crash_history.iter().copied().collect(),
            round_id_history: state.round.round_id_history.iter().copied().collect(),
            live_bettors: state.ledger.live_table(),
        }
    }

    /// Events a newly connected client needs to render the current round
    pub async fn snapshot_events(&self) -> Vec<RoundEvent> {
        let state = self.state.lock().await;
        vec![
            state.phase_event(),
            RoundEvent::CrashHistory(state.round.crash_history.iter().copied().collect()),
            RoundEvent::RoundIdHistory(state.round.round_id_history.iter().copied().collect()),
            RoundEvent::LiveBettingTable(state.ledger.live_table()),
        ]
    }

    pub async fn last_crash(&self) -> Option<CrashReveal> {
        self.state.lock().await.last_crash
    }

    pub async fn last_settlement(&self) -> Option<SettlementReport> {
        self.state.lock().await.last_settlement.clone()
    }

    pub fn player(&self, user_id: &str) -> EngineResult<PlayerAccount> {
        game_store::load_player(self.store.as_ref(), user_id)?
            .ok_or_else(|| EngineError::NotFound(format!("player {}", user_id)))
    }

    /// Admit a bet for the current round, debiting the stake
    pub async fn place_bet(
        &self,
        user_id: &str,
        username: Option<&str>,
        bet_amount: f64,
        payout_multiplier: f64,
    ) -> EngineResult<Applied<BetReceipt>> {
        let mut state = self.state.lock().await;
        let result = self.admit_bet(&mut state, user_id, username, bet_amount, payout_multiplier);
        match &result {
            Ok(applied) => self.metrics.record_bet(applied.receipt.bet_amount),
            Err(e) => {
                self.metrics.record_rejection();
                debug!(user_id, error = %e, "Bet rejected");
            }
        }
        result
    }

    fn admit_bet(
        &self,
        state: &mut EngineState,
        user_id: &str,
        username: Option<&str>,
        bet_amount: f64,
        payout_multiplier: f64,
    ) -> EngineResult<Applied<BetReceipt>> {
        if state.round.phase != Phase::Betting {
            return Err(EngineError::InvalidPhase {
                expected: Phase::Betting,
                actual: state.round.phase,
            });
        }
        validate_bet(bet_amount, payout_multiplier)?;
        if state.ledger.contains(user_id) || state.round.is_active(user_id) {
            return Err(EngineError::DuplicateBet(user_id.to_string()));
        }

        let mut player = self.player(user_id)?;
        if player.balance < bet_amount {
            return Err(EngineError::InsufficientBalance {
                balance: player.balance,
                requested: bet_amount,
            });
        }

        let username = username
            .filter(|name| !name.is_empty())
            .unwrap_or(player.username.as_str())
            .to_string();
        player.balance -= bet_amount;

        state.ledger.admit(BettorEntry::new(
            user_id.to_string(),
            username.clone(),
            bet_amount,
            payout_multiplier,
        ))?;
        state.round.active_players.push(user_id.to_string());

        if let Err(e) =
            game_store::store_round_with_players(self.store.as_ref(), &state.record(), &[player.clone()])
        {
            state.ledger.revoke_last(user_id);
            state.round.active_players.retain(|p| p != user_id);
            warn!(user_id, error = %e, "Failed to persist bet");
            return Err(e.into());
        }

        info!(
            round = state.round.round_number,
            user_id,
            bet_amount,
            payout_multiplier,
            "💰 Bet placed"
        );

        Ok(Applied {
            receipt: BetReceipt {
                round_number: state.round.round_number,
                user_id: user_id.to_string(),
                username,
                bet_amount,
                payout_multiplier,
                balance_after: player.balance,
            },
            events: vec![RoundEvent::LiveBettingTable(state.ledger.live_table())],
        })
    }

    /// Take the current multiplier before the round crashes
    pub async fn cashout_early(&self, user_id: &str) -> EngineResult<Applied<CashoutReceipt>> {
        let mut state = self.state.lock().await;

        if state.round.phase != Phase::Running {
            return Err(EngineError::InvalidPhase {
                expected: Phase::Running,
                actual: state.round.phase,
            });
        }
        let crash = state.round.crash_multiplier.ok_or_else(|| {
            EngineError::NotFound(format!("crash value of round {}", state.round.round_number))
        })?;
        let multiplier = self.curve.at(state.phase_clock.elapsed());
        if multiplier >= crash {
            // the driver has not ticked yet, but the round is over
            return Err(EngineError::InvalidPhase {
                expected: Phase::Running,
                actual: Phase::Crashed,
            });
        }

        let previous = state.ledger.cashable(user_id)?.clone();
        let mut player = self.player(user_id)?;

        let entry = state.ledger.record_cashout(user_id, multiplier)?;
        let payout = entry.bet_amount * multiplier;
        let profit = payout - entry.bet_amount;
        player.balance += payout;

        if let Err(e) =
            game_store::store_round_with_players(self.store.as_ref(), &state.record(), &[player.clone()])
        {
            if let Some(entry) = state.ledger.get_mut(user_id) {
                *entry = previous;
            }
            warn!(user_id, error = %e, "Failed to persist cashout");
            return Err(e.into());
        }

        self.metrics.record_cashout(payout);
        info!(
            round = state.round.round_number,
            user_id,
            multiplier,
            payout,
            "💸 Cashed out"
        );

        Ok(Applied {
            receipt: CashoutReceipt {
                round_number: state.round.round_number,
                user_id: user_id.to_string(),
                multiplier,
                payout,
                profit,
                balance_after: player.balance,
            },
            events: vec![RoundEvent::LiveBettingTable(state.ledger.live_table())],
        })
    }

    /// Move to the next phase if the current one's deadline has passed.
    ///
    /// Returns no events when nothing is due. A failed transition leaves the
    /// in-memory round untouched so the next call retries it.
    pub async fn advance(&self) -> EngineResult<Vec<RoundEvent>> {
        let mut state = self.state.lock().await;
        let elapsed = state.phase_clock.elapsed();
        let phase = state.round.phase;
        let crash = state.round.crash_multiplier;

        let result = match phase {
            Phase::Betting if elapsed >= self.timings.betting_window => {
                self.start_running(&mut state)
            }
            Phase::Running => match crash {
                Some(crash) if self.curve.at(elapsed) >= crash => self.crash_round(&mut state),
                Some(_) => Ok(Vec::new()),
                None => Err(EngineError::NotFound(format!(
                    "crash value of round {}",
                    state.round.round_number
                ))),
            },
            Phase::Crashed if elapsed >= self.timings.display_window => {
                self.open_next_round(&mut state)
            }
            _ => Ok(Vec::new()),
        };

        if result.is_err() {
            self.metrics.record_transition_failure();
        }
        result
    }

    fn start_running(&self, state: &mut EngineState) -> EngineResult<Vec<RoundEvent>> {
        let policy = &self.policy;
        let crash = *state.pending_crash.get_or_insert_with(|| policy.draw());

        let next = state.round.begin_running(crash, Utc::now())?;
        game_store::store_round(
            self.store.as_ref(),
            &RoundRecord {
                round: next.clone(),
                bets: state.ledger.entries().to_vec(),
            },
        )?;

        state.round = next;
        state.pending_crash = None;
        state.phase_clock = Instant::now();

        info!(
            round = state.round.round_number,
            bettors = state.round.active_players.len(),
            "🚀 Round running"
        );
        debug!(round = state.round.round_number, crash, "Crash value drawn");

        Ok(vec![state.phase_event()])
    }

    fn crash_round(&self, state: &mut EngineState) -> EngineResult<Vec<RoundEvent>> {
        let mut next = state.round.crash(Utc::now())?;
        let mut ledger = state.ledger.clone();
        let report = settle_round(&mut next, &mut ledger, self.store.as_ref())?;

        let reveal = CrashReveal {
            round_number: next.round_number,
            crash_multiplier: report.crash_multiplier,
        };

        state.round = next;
        state.ledger = ledger;
        state.phase_clock = Instant::now();
        state.last_crash = Some(reveal);
        self.metrics.record_settlement(report.total_paid, report.failures);
        state.last_settlement = Some(report);

        info!(
            round = reveal.round_number,
            crash = reveal.crash_multiplier,
            "💥 Round crashed"
        );

        Ok(vec![
            state.phase_event(),
            RoundEvent::CrashRevealed {
                round_number: reveal.round_number,
                crash_multiplier: reveal.crash_multiplier,
            },
            RoundEvent::LiveBettingTable(state.ledger.live_table()),
        ])
    }

    fn open_next_round(&self, state: &mut EngineState) -> EngineResult<Vec<RoundEvent>> {
        let next = state
            .round
            .open_next(self.timings.history_len, Utc::now())?;
        game_store::store_round(
            self.store.as_ref(),
            &RoundRecord {
                round: next.clone(),
                bets: Vec::new(),
            },
        )?;

        state.round = next;
        state.ledger = BetLedger::new();
        state.phase_clock = Instant::now();

        info!(round = state.round.round_number, "🎲 Betting open");

        Ok(vec![
            state.phase_event(),
            RoundEvent::CrashHistory(state.round.crash_history.iter().copied().collect()),
            RoundEvent::RoundIdHistory(state.round.round_id_history.iter().copied().collect()),
            RoundEvent::LiveBettingTable(Vec::new()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::crash_policy::FixedPolicy;
    use crate::storage::MemoryBackend;

    fn engine(crash: f64) -> (RoundEngine, Arc<MemoryBackend>) {
        let store = Arc::new(MemoryBackend::new());
        let engine = RoundEngine::bootstrap(
            &CrashConfig::testing(),
            store.clone(),
            Arc::new(FixedPolicy::new(crash)),
        )
        .unwrap();
        (engine, store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_creates_first_round_and_seeds_player() {
        let (engine, store) = engine(2.0);
        let status = engine.status().await;
        assert_eq!(status.round_number, 1);
        assert_eq!(status.phase, Phase::Betting);
        assert!(status.current_multiplier.is_none());
        assert!(engine.last_crash().await.is_none());

        assert_eq!(engine.player("testuser").unwrap().balance, 1000.0);
        assert!(game_store::load_round(store.as_ref()).unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_advance_waits_for_deadline() {
        let (engine, _) = engine(2.0);
        assert!(engine.advance().await.unwrap().is_empty());

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(engine.advance().await.unwrap().is_empty());
        assert_eq!(engine.status().await.phase, Phase::Betting);

        tokio::time::advance(Duration::from_millis(1)).await;
        let events = engine.advance().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(engine.status().await.phase, Phase::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_place_bet_rejections() {
        let (engine, _) = engine(2.0);

        assert!(matches!(
            engine.place_bet("testuser", None, -1.0, 2.0).await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            engine.place_bet("nobody", None, 10.0, 2.0).await,
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            engine.place_bet("testuser", None, 5000.0, 2.0).await,
            Err(EngineError::InsufficientBalance { .. })
        ));

        let applied = engine.place_bet("testuser", Some("Tess"), 100.0, 2.0).await.unwrap();
        assert_eq!(applied.receipt.balance_after, 900.0);
        assert_eq!(applied.receipt.username, "Tess");
        assert_eq!(applied.events.len(), 1);

        assert!(matches!(
            engine.place_bet("testuser", None, 10.0, 2.0).await,
            Err(EngineError::DuplicateBet(_))
        ));
        assert_eq!(engine.player("testuser").unwrap().balance, 900.0);

        let snapshot = engine.metrics().snapshot();
        assert_eq!(snapshot.bets_placed, 1);
        assert_eq!(snapshot.bets_rejected, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_multiplier_is_clamped() {
        let (engine, _) = engine(1.5);
        tokio::time::advance(Duration::from_secs(1)).await;
        engine.advance().await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        let status = engine.status().await;
        assert_eq!(status.phase, Phase::Running);
        assert_eq!(status.current_multiplier, Some(1.5));
        assert!(status.crash_multiplier.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cashout_rejected_outside_running() {
        let (engine, _) = engine(2.0);
        engine.place_bet("testuser", None, 100.0, 5.0).await.unwrap();
        assert!(matches!(
            engine.cashout_early("testuser").await,
            Err(EngineError::InvalidPhase { expected: Phase::Running, actual: Phase::Betting })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_while_running_settles_round() {
        let store = Arc::new(MemoryBackend::new());
        let config = CrashConfig::testing();
        {
            let engine =
                RoundEngine::bootstrap(&config, store.clone(), Arc::new(FixedPolicy::new(3.0)))
                    .unwrap();
            engine.place_bet("testuser", None, 100.0, 2.0).await.unwrap();
            tokio::time::advance(Duration::from_secs(1)).await;
            engine.advance().await.unwrap();
            assert_eq!(engine.status().await.phase, Phase::Running);
        }

        let restarted =
            RoundEngine::bootstrap(&config, store.clone(), Arc::new(FixedPolicy::new(3.0))).unwrap();
        let status = restarted.status().await;
        assert_eq!(status.phase, Phase::Crashed);
        assert_eq!(status.crash_multiplier, Some(3.0));
        assert_eq!(restarted.player("testuser").unwrap().balance, 1100.0);
        assert_eq!(
            restarted.last_crash().await,
            Some(CrashReveal { round_number: 1, crash_multiplier: 3.0 })
        );
        assert_eq!(restarted.last_settlement().await.unwrap().winners, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_while_betting_keeps_bets() {
        let store = Arc::new(MemoryBackend::new());
        let config = CrashConfig::testing();
        {
            let engine =
                RoundEngine::bootstrap(&config, store.clone(), Arc::new(FixedPolicy::new(3.0)))
                    .unwrap();
            engine.place_bet("testuser", None, 100.0, 2.0).await.unwrap();
        }

        let restarted =
            RoundEngine::bootstrap(&config, store.clone(), Arc::new(FixedPolicy::new(3.0))).unwrap();
        assert_eq!(restarted.status().await.live_bettors.len(), 1);
        assert!(matches!(
            restarted.place_bet("testuser", None, 10.0, 2.0).await,
            Err(EngineError::DuplicateBet(_))
        ));
        assert_eq!(restarted.player("testuser").unwrap().balance, 900.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_events_cover_every_channel() {
        let (engine, _) = engine(2.0);
        let names: Vec<_> = engine
            .snapshot_events()
            .await
            .iter()
            .map(|e| e.name())
            .collect();
        assert_eq!(
            names,
            vec!["phase_changed", "crash_history", "round_id_history", "live_betting_table"]
        );
    }
}
