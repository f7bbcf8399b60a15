//! Crash game: round state machine, bets, settlement and the engine tying them together

pub mod crash_policy;
pub mod engine;
pub mod events;
pub mod ledger;
pub mod round;
pub mod settlement;
pub mod types;

pub use crash_policy::CrashPolicy;
pub use engine::RoundEngine;
pub use events::{EventSink, RoundEvent};
pub use settlement::SettlementReport;
pub use types::*;
