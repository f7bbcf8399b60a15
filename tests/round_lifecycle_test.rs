//! End-to-end round scenarios driven on a paused clock

use crash_engine::config::{CrashConfig, SeedPlayer};
use crash_engine::errors::{EngineError, StorageError};
use crash_engine::games::crash_policy::{CrashPolicy, FixedPolicy};
use crash_engine::games::{Phase, RoundEngine, RoundEvent};
use crash_engine::storage::{KvBackend, MemoryBackend};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Memory store whose writes can be switched off
#[derive(Default)]
struct FlakyBackend {
    inner: MemoryBackend,
    fail_writes: AtomicBool,
}

impl FlakyBackend {
    fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }
}

impl KvBackend for FlakyBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.check()?;
        self.inner.put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.check()?;
        self.inner.delete(key)
    }

    fn batch_write(&self, items: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StorageError> {
        self.check()?;
        self.inner.batch_write(items)
    }
}

/// Fixed value that counts how often it was asked
struct CountingPolicy {
    value: f64,
    draws: AtomicUsize,
}

impl CrashPolicy for CountingPolicy {
    fn draw(&self) -> f64 {
        self.draws.fetch_add(1, Ordering::SeqCst);
        self.value
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

fn config_with_players(players: &[&str]) -> CrashConfig {
    let mut config = CrashConfig::testing();
    config.bootstrap.seed_players = players
        .iter()
        .map(|p| SeedPlayer {
            user_id: p.to_string(),
            username: p.to_string(),
        })
        .collect();
    config
}

fn engine_with_crash(crash: f64) -> RoundEngine {
    RoundEngine::bootstrap(
        &CrashConfig::testing(),
        Arc::new(MemoryBackend::new()),
        Arc::new(FixedPolicy::new(crash)),
    )
    .unwrap()
}

async fn start_running(engine: &RoundEngine) {
    tokio::time::advance(Duration::from_millis(1_000)).await;
    engine.advance().await.unwrap();
    assert_eq!(engine.status().await.phase, Phase::Running);
}

async fn run_to_crash(engine: &RoundEngine, crash: f64) -> Vec<RoundEvent> {
    let wait = engine.curve().time_to_reach(crash) + Duration::from_millis(1);
    tokio::time::advance(wait).await;
    let events = engine.advance().await.unwrap();
    assert_eq!(engine.status().await.phase, Phase::Crashed);
    events
}

async fn open_next(engine: &RoundEngine) -> Vec<RoundEvent> {
    tokio::time::advance(Duration::from_millis(500)).await;
    let events = engine.advance().await.unwrap();
    assert_eq!(engine.status().await.phase, Phase::Betting);
    events
}

#[tokio::test(start_paused = true)]
async fn test_winning_target_is_paid() {
    let engine = engine_with_crash(2.5);
    engine.place_bet("testuser", None, 100.0, 2.0).await.unwrap();
    assert_eq!(engine.player("testuser").unwrap().balance, 900.0);

    start_running(&engine).await;
    let events = run_to_crash(&engine, 2.5).await;

    assert_eq!(engine.player("testuser").unwrap().balance, 1100.0);
    assert!(events.iter().any(|e| matches!(
        e,
        RoundEvent::CrashRevealed { round_number: 1, crash_multiplier } if *crash_multiplier == 2.5
    )));

    let status = engine.status().await;
    assert_eq!(status.crash_multiplier, Some(2.5));
    assert_eq!(status.live_bettors[0].profit, Some(100.0));
    assert!(!status.live_bettors[0].is_live);
}

#[tokio::test(start_paused = true)]
async fn test_missed_target_forfeits_stake() {
    let engine = engine_with_crash(2.5);
    engine.place_bet("testuser", None, 100.0, 3.0).await.unwrap();

    start_running(&engine).await;
    run_to_crash(&engine, 2.5).await;

    assert_eq!(engine.player("testuser").unwrap().balance, 900.0);
    let status = engine.status().await;
    assert_eq!(status.live_bettors[0].profit, Some(-100.0));
}

#[tokio::test(start_paused = true)]
async fn test_early_cashout_pays_current_multiplier() {
    let engine = engine_with_crash(3.0);
    engine.place_bet("testuser", None, 100.0, 5.0).await.unwrap();
    start_running(&engine).await;

    tokio::time::advance(engine.curve().time_to_reach(2.0)).await;
    let applied = engine.cashout_early("testuser").await.unwrap();
    assert!((applied.receipt.multiplier - 2.0).abs() < 1e-6);
    assert!((applied.receipt.payout - 200.0).abs() < 1e-4);
    assert!((applied.receipt.balance_after - 1100.0).abs() < 1e-4);
    assert!(matches!(
        applied.events.as_slice(),
        [RoundEvent::LiveBettingTable(rows)] if !rows[0].is_live
    ));

    assert!(matches!(
        engine.cashout_early("testuser").await,
        Err(EngineError::AlreadySettled(_))
    ));

    run_to_crash(&engine, 3.0).await;
    let report = engine.last_settlement().await.unwrap();
    assert_eq!(report.processed(), 0);
    assert!((engine.player("testuser").unwrap().balance - 1100.0).abs() < 1e-4);
}

#[tokio::test(start_paused = true)]
async fn test_bet_while_running_is_rejected() {
    let engine = engine_with_crash(2.0);
    start_running(&engine).await;

    let err = engine
        .place_bet("testuser", None, 100.0, 2.0)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidPhase { expected: Phase::Betting, actual: Phase::Running }
    ));
    assert_eq!(engine.player("testuser").unwrap().balance, 1000.0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_duplicate_bets_debit_once() {
    let engine = Arc::new(engine_with_crash(2.0));

    let (first, second) = tokio::join!(
        engine.place_bet("testuser", None, 100.0, 2.0),
        engine.place_bet("testuser", None, 100.0, 2.0),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|r| matches!(r, Err(EngineError::DuplicateBet(_))))
            .count(),
        1
    );
    assert_eq!(engine.player("testuser").unwrap().balance, 900.0);
    assert_eq!(engine.status().await.live_bettors.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cashout_after_crash_point_is_rejected() {
    let engine = engine_with_crash(1.5);
    engine.place_bet("testuser", None, 100.0, 10.0).await.unwrap();
    start_running(&engine).await;

    // past the crash point but before the next tick
    tokio::time::advance(engine.curve().time_to_reach(1.5) + Duration::from_millis(5)).await;
    assert!(matches!(
        engine.cashout_early("testuser").await,
        Err(EngineError::InvalidPhase { expected: Phase::Running, actual: Phase::Crashed })
    ));
    assert_eq!(engine.player("testuser").unwrap().balance, 900.0);
}

#[tokio::test(start_paused = true)]
async fn test_balance_deltas_match_winnings_minus_stakes() {
    let players = ["alice", "bob", "carol", "dave"];
    let engine = RoundEngine::bootstrap(
        &config_with_players(&players),
        Arc::new(MemoryBackend::new()),
        Arc::new(FixedPolicy::new(2.5)),
    )
    .unwrap();

    let bets = [(50.0, 1.5), (120.0, 2.5), (80.0, 2.6), (10.0, 9.0)];
    for (player, (amount, target)) in players.iter().zip(bets) {
        engine.place_bet(player, None, amount, target).await.unwrap();
    }

    start_running(&engine).await;
    run_to_crash(&engine, 2.5).await;

    let total_delta: f64 = players
        .iter()
        .map(|p| engine.player(p).unwrap().balance - 1000.0)
        .sum();
    let winnings: f64 = bets
        .iter()
        .filter(|(_, target)| *target <= 2.5)
        .map(|(amount, target)| amount * target)
        .sum();
    let stakes: f64 = bets.iter().map(|(amount, _)| amount).sum();
    assert!((total_delta - (winnings - stakes)).abs() < 1e-9);

    let report = engine.last_settlement().await.unwrap();
    assert_eq!(report.winners, 2);
    assert_eq!(report.losers, 2);
    assert!((report.net_house_delta() - (stakes - winnings)).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_settlement_is_not_repeated_during_display() {
    let engine = engine_with_crash(2.0);
    engine.place_bet("testuser", None, 100.0, 1.5).await.unwrap();
    start_running(&engine).await;
    run_to_crash(&engine, 2.0).await;
    assert_eq!(engine.player("testuser").unwrap().balance, 1050.0);

    for _ in 0..5 {
        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(engine.advance().await.unwrap().is_empty());
    }
    assert_eq!(engine.player("testuser").unwrap().balance, 1050.0);
    assert_eq!(engine.metrics().snapshot().rounds_completed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_storage_failure_retries_without_redrawing() {
    let store = Arc::new(FlakyBackend::default());
    let policy = Arc::new(CountingPolicy {
        value: 2.0,
        draws: AtomicUsize::new(0),
    });
    let engine =
        RoundEngine::bootstrap(&CrashConfig::testing(), store.clone(), policy.clone()).unwrap();
    engine.place_bet("testuser", None, 100.0, 2.0).await.unwrap();

    store.set_failing(true);
    tokio::time::advance(Duration::from_millis(1_000)).await;
    assert!(matches!(engine.advance().await, Err(EngineError::Storage(_))));
    assert_eq!(engine.status().await.phase, Phase::Betting);

    tokio::time::advance(Duration::from_millis(10)).await;
    assert!(engine.advance().await.is_err());

    store.set_failing(false);
    tokio::time::advance(Duration::from_millis(10)).await;
    engine.advance().await.unwrap();
    assert_eq!(engine.status().await.phase, Phase::Running);
    assert_eq!(policy.draws.load(Ordering::SeqCst), 1);

    // a failed crash transition settles nothing and keeps the round running
    store.set_failing(true);
    tokio::time::advance(engine.curve().time_to_reach(2.0) + Duration::from_millis(1)).await;
    assert!(engine.advance().await.is_err());
    assert_eq!(engine.status().await.phase, Phase::Running);
    assert_eq!(engine.player("testuser").unwrap().balance, 900.0);

    store.set_failing(false);
    engine.advance().await.unwrap();
    let status = engine.status().await;
    assert_eq!(status.phase, Phase::Crashed);
    assert_eq!(status.crash_multiplier, Some(2.0));
    assert_eq!(engine.player("testuser").unwrap().balance, 1100.0);
    assert_eq!(policy.draws.load(Ordering::SeqCst), 1);
    assert_eq!(engine.metrics().snapshot().transition_failures, 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_bet_write_leaves_no_trace() {
    let store = Arc::new(FlakyBackend::default());
    let engine = RoundEngine::bootstrap(
        &CrashConfig::testing(),
        store.clone(),
        Arc::new(FixedPolicy::new(2.0)),
    )
    .unwrap();

    store.set_failing(true);
    assert!(matches!(
        engine.place_bet("testuser", None, 100.0, 2.0).await,
        Err(EngineError::Storage(_))
    ));
    assert!(engine.status().await.live_bettors.is_empty());

    store.set_failing(false);
    let applied = engine.place_bet("testuser", None, 100.0, 2.0).await.unwrap();
    assert_eq!(applied.receipt.balance_after, 900.0);
}

#[tokio::test(start_paused = true)]
async fn test_history_is_bounded_and_rounds_advance() {
    let mut config = CrashConfig::testing();
    config.round.history_len = 3;
    let engine = RoundEngine::bootstrap(
        &config,
        Arc::new(MemoryBackend::new()),
        Arc::new(FixedPolicy::new(1.0)),
    )
    .unwrap();

    let mut last_events = Vec::new();
    for _ in 0..5 {
        start_running(&engine).await;
        run_to_crash(&engine, 1.0).await;
        last_events = open_next(&engine).await;
    }

    let status = engine.status().await;
    assert_eq!(status.round_number, 6);
    assert_eq!(status.crash_history, vec![1.0, 1.0, 1.0]);
    assert_eq!(status.round_id_history, vec![3, 4, 5]);
    assert!(last_events
        .iter()
        .any(|e| matches!(e, RoundEvent::RoundIdHistory(ids) if ids == &vec![3, 4, 5])));
    assert!(last_events
        .iter()
        .any(|e| matches!(e, RoundEvent::LiveBettingTable(rows) if rows.is_empty())));

    let reveal = engine.last_crash().await.unwrap();
    assert_eq!(reveal.round_number, 5);
}

#[tokio::test(start_paused = true)]
async fn test_crash_value_constant_from_running_to_reset() {
    let engine = engine_with_crash(4.2);
    start_running(&engine).await;

    for _ in 0..3 {
        tokio::time::advance(Duration::from_secs(2)).await;
        engine.advance().await.unwrap();
        let status = engine.status().await;
        if status.phase == Phase::Running {
            assert!(status.current_multiplier.unwrap() <= 4.2);
        }
    }

    run_to_crash(&engine, 4.2).await;
    assert_eq!(engine.status().await.crash_multiplier, Some(4.2));
    assert_eq!(engine.last_crash().await.unwrap().crash_multiplier, 4.2);

    open_next(&engine).await;
    let status = engine.status().await;
    assert_eq!(status.crash_multiplier, None);
    assert_eq!(status.crash_history, vec![4.2]);
}
