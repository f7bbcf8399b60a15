//! Round driver
//!
//! Ticks the engine on a fixed interval and forwards whatever events the
//! transitions produce. It never decides when a phase ends; the engine does.

use crate::games::engine::RoundEngine;
use crate::games::events::{dispatch, EventSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

pub struct RoundDriver {
    engine: Arc<RoundEngine>,
    sink: Arc<dyn EventSink>,
    tick: Duration,
}

/// Running driver task plus the switch that stops it
pub struct DriverHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DriverHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Round driver task ended abnormally: {}", e);
        }
    }
}

impl RoundDriver {
    pub fn new(engine: Arc<RoundEngine>, sink: Arc<dyn EventSink>, tick: Duration) -> Self {
        Self { engine, sink, tick }
    }

    pub fn spawn(self) -> DriverHandle {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        DriverHandle { shutdown, task }
    }

    /// Advance the round once per tick until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("⏱️  Round driver started (tick {:?})", self.tick);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick_once().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("⏱️  Round driver stopped");
    }

    async fn tick_once(&self) {
        match self.engine.advance().await {
            Ok(events) => dispatch(self.sink.as_ref(), events),
            Err(e) => warn!(error = %e, "Round transition failed, retrying next tick"),
        }
    }
}
