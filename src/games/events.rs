//! Events produced by engine operations
//!
//! Engine calls return these as values; a dispatcher hands them to whatever
//! sink is wired in, so the state machine never touches the transport.

use crate::games::types::{LiveBettorRow, Phase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum RoundEvent {
    LiveBettingTable(Vec<LiveBettorRow>),
    CrashHistory(Vec<f64>),
    RoundIdHistory(Vec<u64>),
    PhaseChanged {
        round_number: u64,
        phase: Phase,
        phase_started_at: DateTime<Utc>,
    },
    CrashRevealed {
        round_number: u64,
        crash_multiplier: f64,
    },
}

impl RoundEvent {
    /// Channel name clients subscribe to
    pub fn name(&self) -> &'static str {
        match self {
            RoundEvent::LiveBettingTable(_) => "live_betting_table",
            RoundEvent::CrashHistory(_) => "crash_history",
            RoundEvent::RoundIdHistory(_) => "round_id_history",
            RoundEvent::PhaseChanged { .. } => "phase_changed",
            RoundEvent::CrashRevealed { .. } => "crash_revealed",
        }
    }
}

/// One-way, fire-and-forget broadcast target
pub trait EventSink: Send + Sync {
    fn publish(&self, event: RoundEvent);
}

/// Forward events in order
pub fn dispatch(sink: &dyn EventSink, events: Vec<RoundEvent>) {
    for event in events {
        tracing::trace!(event = event.name(), "Dispatching round event");
        sink.publish(event);
    }
}

/// Sink that keeps everything it receives
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<RoundEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<RoundEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: RoundEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
