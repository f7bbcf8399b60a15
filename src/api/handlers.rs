//! Request Handlers
//!
//! Thin adapters from HTTP to the round engine. Events returned by a
//! state-changing call are forwarded to the WebSocket fan-out.

use super::{
    errors::ApiError,
    middleware::{ApiJson, CallerIdentity, RequestId},
    models::*,
    websocket::WebSocketManager,
};
use crate::games::engine::RoundEngine;
use crate::games::events::dispatch;
use crate::games::types::{CrashReveal, PlayerAccount, RoundStatus};
use axum::{extract::State, Extension, Json};
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub engine: Arc<RoundEngine>,
    pub websocket_manager: Arc<WebSocketManager>,
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let status = state.engine.status().await;
    Json(HealthResponse {
        status: "Running".to_string(),
        round_number: status.round_number,
        phase: status.phase,
        websocket_clients: state.websocket_manager.client_count(),
    })
}

/// GET /round/status
pub async fn round_status_handler(State(state): State<Arc<AppState>>) -> Json<RoundStatus> {
    Json(state.engine.status().await)
}

/// POST /round/bet
pub async fn place_bet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    ApiJson(request): ApiJson<PlaceBetRequest>,
) -> Result<Json<BetResponse>, ApiError> {
    // non-numeric fields arrive as NaN so the engine's phase check still runs first
    let (bet_amount, payout_multiplier) = request.amounts();

    let applied = state
        .engine
        .place_bet(
            &caller.user_id,
            caller.username.as_deref(),
            bet_amount,
            payout_multiplier,
        )
        .await
        .map_err(|e| ApiError::engine(request_id.0.clone(), e))?;

    dispatch(state.websocket_manager.as_ref(), applied.events);

    Ok(Json(BetResponse {
        message: format!("Bet placed for {}", applied.receipt.username),
        receipt: applied.receipt,
    }))
}

/// POST /round/cashout
pub async fn cashout_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
) -> Result<Json<CashoutResponse>, ApiError> {
    let applied = state
        .engine
        .cashout_early(&caller.user_id)
        .await
        .map_err(|e| ApiError::engine(request_id.0.clone(), e))?;

    dispatch(state.websocket_manager.as_ref(), applied.events);

    Ok(Json(CashoutResponse {
        message: format!("Cashed out at {:.2}x", applied.receipt.multiplier),
        receipt: applied.receipt,
    }))
}

/// GET /round/crash
pub async fn crash_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<CrashReveal>, ApiError> {
    state.engine.last_crash().await.map(Json).ok_or_else(|| {
        ApiError::not_found(request_id.0.clone(), "No round has crashed yet".to_string())
    })
}

/// GET /player
pub async fn player_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
) -> Result<Json<PlayerAccount>, ApiError> {
    state
        .engine
        .player(&caller.user_id)
        .map(Json)
        .map_err(|e| ApiError::engine(request_id.0.clone(), e))
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        game: state.engine.metrics().snapshot(),
        websocket_clients: state.websocket_manager.client_count(),
    })
}
