//! API Error Handling
//!
//! Structured error responses with proper HTTP status codes and request tracking.

use crate::errors::EngineError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

/// Error body with structured information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code (INVALID_PHASE, DUPLICATE_BET, NOT_FOUND, etc.)
    pub code: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error types with request tracking
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    /// Rejection raised by the round engine
    Engine(EngineError),
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
}

impl ApiError {
    pub fn engine(request_id: String, error: EngineError) -> Self {
        Self {
            kind: ApiErrorKind::Engine(error),
            request_id,
        }
    }

    pub fn not_found(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::NotFound(message),
            request_id,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(message),
            request_id,
        }
    }

    pub fn unauthorized(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::Unauthorized(message),
            request_id,
        }
    }

    pub fn status(&self) -> StatusCode {
        match &self.kind {
            ApiErrorKind::Engine(e) => engine_status(e),
            ApiErrorKind::NotFound(_) => StatusCode::NOT_FOUND,
            ApiErrorKind::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiErrorKind::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    fn code(&self) -> &'static str {
        match &self.kind {
            ApiErrorKind::Engine(e) => e.code(),
            ApiErrorKind::NotFound(_) => "NOT_FOUND",
            ApiErrorKind::BadRequest(_) => "VALIDATION_ERROR",
            ApiErrorKind::Unauthorized(_) => "UNAUTHORIZED",
        }
    }
}

/// HTTP status for each engine rejection
pub fn engine_status(error: &EngineError) -> StatusCode {
    match error {
        EngineError::InvalidPhase { .. } => StatusCode::CONFLICT,
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::DuplicateBet(_) => StatusCode::CONFLICT,
        EngineError::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::AlreadySettled(_) => StatusCode::CONFLICT,
        EngineError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::Engine(e) => write!(f, "[{}] {}", self.request_id, e),
            ApiErrorKind::NotFound(msg) => write!(f, "[{}] Not Found: {}", self.request_id, msg),
            ApiErrorKind::BadRequest(msg) => write!(f, "[{}] Bad Request: {}", self.request_id, msg),
            ApiErrorKind::Unauthorized(msg) => write!(f, "[{}] Unauthorized: {}", self.request_id, msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let message = self.kind_message();
        let details = match &self.kind {
            ApiErrorKind::Engine(EngineError::InsufficientBalance { balance, requested }) => {
                Some(serde_json::json!({ "balance": balance, "requested": requested }))
            }
            ApiErrorKind::Engine(EngineError::InvalidPhase { expected, actual }) => {
                Some(serde_json::json!({ "expected": expected, "actual": actual }))
            }
            _ => None,
        };

        if status.is_server_error() {
            tracing::warn!(request_id = %self.request_id, code, "{}", message);
        }

        let body = Json(ErrorResponse {
            request_id: self.request_id.clone(),
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        });

        (status, body).into_response()
    }
}

impl ApiError {
    fn kind_message(&self) -> String {
        match &self.kind {
            ApiErrorKind::Engine(e) => e.to_string(),
            ApiErrorKind::NotFound(msg)
            | ApiErrorKind::BadRequest(msg)
            | ApiErrorKind::Unauthorized(msg) => msg.clone(),
        }
    }
}
