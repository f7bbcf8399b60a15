//! API Request and Response Models

use crate::games::types::{BetReceipt, CashoutReceipt, Phase};
use crate::metrics::MetricsSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub round_number: u64,
    pub phase: Phase,
    pub websocket_clients: u64,
}

/// Bet body. Fields stay untyped so a non-numeric value is rejected by the
/// engine, after its phase check, instead of by deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceBetRequest {
    #[serde(default)]
    pub bet_amount: Value,
    #[serde(default)]
    pub payout_multiplier: Value,
}

impl PlaceBetRequest {
    /// `(bet_amount, payout_multiplier)`, with NaN for anything non-numeric
    pub fn amounts(&self) -> (f64, f64) {
        (
            numeric_field(&self.bet_amount),
            numeric_field(&self.payout_multiplier),
        )
    }
}

/// Accept a JSON number or a numeric string
pub fn numeric_field(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.unwrap_or(f64::NAN)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetResponse {
    pub message: String,
    #[serde(flatten)]
    pub receipt: BetReceipt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashoutResponse {
    pub message: String,
    #[serde(flatten)]
    pub receipt: CashoutReceipt,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub game: MetricsSnapshot,
    pub websocket_clients: u64,
}
