//! Configuration management with validation and defaults
//!
//! Values come from an optional TOML file, then `CRASH_*` environment
//! overrides, then validation.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Complete service configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    pub round: RoundConfig,
    pub crash_policy: CrashPolicyConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub bootstrap: BootstrapConfig,
    pub monitoring: MonitoringConfig,
}

/// Round timing and curve parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundConfig {
    pub betting_window_ms: u64,
    /// How long a crashed round stays on screen before the next betting phase
    pub display_window_ms: u64,
    pub tick_interval_ms: u64,
    /// Exponent rate of the multiplier curve, per second
    pub growth_rate: f64,
    /// Bound on crash_history and round_id_history
    pub history_len: usize,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            betting_window_ms: 10_000,
            display_window_ms: 3_000,
            tick_interval_ms: 50,
            growth_rate: 0.07,
            history_len: 25,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CrashPolicyKind {
    HouseEdge,
    Uniform,
    Fixed,
}

/// Crash point distribution selection
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashPolicyConfig {
    pub kind: CrashPolicyKind,
    /// Fraction of rounds kept by the house, e.g. 0.01
    pub house_edge: f64,
    pub max_multiplier: f64,
    pub uniform_min: u32,
    pub uniform_max: u32,
    pub fixed_multiplier: f64,
}

impl Default for CrashPolicyConfig {
    fn default() -> Self {
        Self {
            kind: CrashPolicyKind::HouseEdge,
            house_edge: 0.01,
            max_multiplier: 100.0,
            uniform_min: 1,
            uniform_max: 6,
            fixed_multiplier: 2.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendKind {
    Memory,
    Rocksdb,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    pub data_directory: String,
    /// Whether to clear database on startup (testing only!)
    pub clear_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::Rocksdb,
            data_directory: "./DB/crash_data".to_string(),
            clear_on_start: false,
        }
    }
}

/// HTTP server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
    /// Capacity of the event fan-out channel
    pub broadcast_capacity: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
            broadcast_capacity: 1024,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SeedPlayer {
    pub user_id: String,
    pub username: String,
}

/// Accounts created at startup when missing from the store
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub default_balance: f64,
    pub seed_players: Vec<SeedPlayer>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            default_balance: 1000.0,
            seed_players: vec![SeedPlayer {
                user_id: "testuser".to_string(),
                username: "testuser".to_string(),
            }],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// `tracing_subscriber::EnvFilter` directive used when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_filter: "crash_engine=info,tower_http=info".to_string(),
        }
    }
}

impl CrashConfig {
    /// In-memory store and short windows, for tests and local demos
    pub fn testing() -> Self {
        Self {
            round: RoundConfig {
                betting_window_ms: 1_000,
                display_window_ms: 500,
                tick_interval_ms: 10,
                ..Default::default()
            },
            storage: StorageConfig {
                backend: StorageBackendKind::Memory,
                clear_on_start: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn betting_window(&self) -> Duration {
        Duration::from_millis(self.round.betting_window_ms)
    }

    pub fn display_window(&self) -> Duration {
        Duration::from_millis(self.round.display_window_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.round.tick_interval_ms)
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.round.betting_window_ms == 0 {
            return Err(invalid("round.betting_window_ms", "0", "Betting window cannot be zero"));
        }
        if self.round.tick_interval_ms == 0 {
            return Err(invalid("round.tick_interval_ms", "0", "Tick interval cannot be zero"));
        }
        if self.round.tick_interval_ms > self.round.betting_window_ms {
            return Err(ConfigurationError::ValidationFailed(
                "tick interval must not exceed the betting window".to_string(),
            ));
        }
        if !(self.round.growth_rate.is_finite() && self.round.growth_rate > 0.0) {
            return Err(invalid(
                "round.growth_rate",
                &self.round.growth_rate.to_string(),
                "Growth rate must be a positive number",
            ));
        }
        if self.round.history_len == 0 {
            return Err(invalid("round.history_len", "0", "History length cannot be zero"));
        }

        let policy = &self.crash_policy;
        if !(0.0..1.0).contains(&policy.house_edge) {
            return Err(invalid(
                "crash_policy.house_edge",
                &policy.house_edge.to_string(),
                "House edge must be in [0, 1)",
            ));
        }
        if !(policy.max_multiplier.is_finite() && policy.max_multiplier >= 1.0) {
            return Err(invalid(
                "crash_policy.max_multiplier",
                &policy.max_multiplier.to_string(),
                "Cap must be at least 1.0",
            ));
        }
        if policy.uniform_min == 0 || policy.uniform_min > policy.uniform_max {
            return Err(ConfigurationError::ValidationFailed(format!(
                "uniform range [{}, {}] is empty or starts at zero",
                policy.uniform_min, policy.uniform_max
            )));
        }
        if !(policy.fixed_multiplier.is_finite() && policy.fixed_multiplier >= 1.0) {
            return Err(invalid(
                "crash_policy.fixed_multiplier",
                &policy.fixed_multiplier.to_string(),
                "Fixed multiplier must be at least 1.0",
            ));
        }

        if self.storage.backend == StorageBackendKind::Rocksdb
            && self.storage.data_directory.is_empty()
        {
            return Err(ConfigurationError::MissingRequired(
                "storage.data_directory".to_string(),
            ));
        }
        if self.api.port == 0 {
            return Err(invalid("api.port", "0", "Port cannot be zero"));
        }
        if self.api.broadcast_capacity == 0 {
            return Err(invalid("api.broadcast_capacity", "0", "Capacity cannot be zero"));
        }
        if self.bootstrap.default_balance < 0.0 || !self.bootstrap.default_balance.is_finite() {
            return Err(invalid(
                "bootstrap.default_balance",
                &self.bootstrap.default_balance.to_string(),
                "Balance must be a non-negative number",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> Result<CrashConfig, ConfigurationError> {
        let mut config = match self.config_path {
            Some(ref path) => self.load_from_file(path)?,
            None => CrashConfig::default(),
        };

        self.apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> Result<CrashConfig, ConfigurationError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)))
    }

    fn apply_env_overrides(&self, config: &mut CrashConfig) -> Result<(), ConfigurationError> {
        if let Ok(host) = env::var("CRASH_API_HOST") {
            config.api.host = host;
        }
        if let Ok(port) = env::var("CRASH_API_PORT") {
            config.api.port = parse_env("CRASH_API_PORT", port, "Invalid port number")?;
        }
        if let Ok(data_dir) = env::var("CRASH_DATA_DIR") {
            config.storage.data_directory = data_dir;
        }
        if let Ok(window) = env::var("CRASH_BETTING_WINDOW_MS") {
            config.round.betting_window_ms =
                parse_env("CRASH_BETTING_WINDOW_MS", window, "Invalid duration")?;
        }
        if let Ok(kind) = env::var("CRASH_POLICY") {
            config.crash_policy.kind = match kind.as_str() {
                "house_edge" => CrashPolicyKind::HouseEdge,
                "uniform" => CrashPolicyKind::Uniform,
                "fixed" => CrashPolicyKind::Fixed,
                _ => {
                    return Err(invalid(
                        "CRASH_POLICY",
                        &kind,
                        "Expected house_edge, uniform or fixed",
                    ))
                }
            };
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &CrashConfig, path: &str) -> Result<(), ConfigurationError> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)))
    }
}

fn parse_env<T: std::str::FromStr>(
    field: &str,
    value: String,
    reason: &str,
) -> Result<T, ConfigurationError> {
    value.parse().map_err(|_| ConfigurationError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}
