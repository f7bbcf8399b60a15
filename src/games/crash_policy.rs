//! Crash point generation
//!
//! A policy only sees fresh entropy. It is never handed bets or player counts,
//! so the crash value cannot be steered by what is at stake.

use crate::config::{CrashPolicyConfig, CrashPolicyKind};
use rand::Rng;
use std::sync::Arc;

pub trait CrashPolicy: Send + Sync {
    /// Draw the crash multiplier for one round (always >= 1.0)
    fn draw(&self) -> f64;

    fn name(&self) -> &'static str;
}

/// Build the policy selected in configuration
pub fn from_config(config: &CrashPolicyConfig) -> Arc<dyn CrashPolicy> {
    match config.kind {
        CrashPolicyKind::HouseEdge => {
            Arc::new(HouseEdgePolicy::new(config.house_edge, config.max_multiplier))
        }
        CrashPolicyKind::Uniform => {
            Arc::new(UniformIntegerPolicy::new(config.uniform_min, config.uniform_max))
        }
        CrashPolicyKind::Fixed => Arc::new(FixedPolicy::new(config.fixed_multiplier)),
    }
}

/// Heavy-tailed curve: `P(crash >= x) = (1 - edge) / x`, capped
#[derive(Debug, Clone)]
pub struct HouseEdgePolicy {
    house_edge: f64,
    max_multiplier: f64,
}

impl HouseEdgePolicy {
    pub fn new(house_edge: f64, max_multiplier: f64) -> Self {
        Self {
            house_edge,
            max_multiplier: max_multiplier.max(1.0),
        }
    }

    /// Map a uniform sample in [0, 1) to a crash multiplier
    pub fn crash_point(&self, u: f64) -> f64 {
        let raw = (1.0 - self.house_edge) / (1.0 - u);
        // two decimals, rounded down so the displayed value is never above the real one
        let floored = (raw * 100.0 + 1e-9).floor() / 100.0;
        floored.clamp(1.0, self.max_multiplier)
    }
}

impl CrashPolicy for HouseEdgePolicy {
    fn draw(&self) -> f64 {
        let u: f64 = rand::thread_rng().gen();
        self.crash_point(u)
    }

    fn name(&self) -> &'static str {
        "house_edge"
    }
}

/// Whole-number crash points drawn uniformly from `[min, max]`
#[derive(Debug, Clone)]
pub struct UniformIntegerPolicy {
    min: u32,
    max: u32,
}

impl UniformIntegerPolicy {
    pub fn new(min: u32, max: u32) -> Self {
        Self {
            min: min.max(1),
            max: max.max(min.max(1)),
        }
    }
}

impl CrashPolicy for UniformIntegerPolicy {
    fn draw(&self) -> f64 {
        rand::thread_rng().gen_range(self.min..=self.max) as f64
    }

    fn name(&self) -> &'static str {
        "uniform"
    }
}

/// Always the same value; for demos and deterministic tests
#[derive(Debug, Clone)]
pub struct FixedPolicy {
    multiplier: f64,
}

impl FixedPolicy {
    pub fn new(multiplier: f64) -> Self {
        Self {
            multiplier: multiplier.max(1.0),
        }
    }
}

impl CrashPolicy for FixedPolicy {
    fn draw(&self) -> f64 {
        self.multiplier
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}
