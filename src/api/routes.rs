//! Route Definitions
//!
//! Maps URLs to handlers with type-safe routing.

use super::{handlers::*, websocket::websocket_handler};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        // Round endpoints
        .route("/round/status", get(round_status_handler))
        .route("/round/bet", post(place_bet_handler))
        .route("/round/cashout", post(cashout_handler))
        .route("/round/crash", get(crash_handler))
        .route("/player", get(player_handler))
        // Real-time event stream
        .route("/ws", get(websocket_handler))
        .with_state(state)
}
