//! Crash - multiplayer crash betting round engine
//!
//! A single round cycles BETTING -> RUNNING -> CRASHED. Players stake during
//! betting, watch a multiplier grow while running, and are paid when their
//! target is reached or when they cash out before the crash.

pub mod api;
pub mod config;
pub mod driver;
pub mod errors;
pub mod game_store;
pub mod games;
pub mod metrics;
pub mod storage;

pub use config::CrashConfig;
pub use errors::{EngineError, EngineResult};
pub use games::RoundEngine;
