//! Error types for the crash round engine
//!
//! Every request-level failure is recoverable: the request fails on its own and
//! the round keeps running.

use crate::games::types::Phase;
use thiserror::Error;

/// Root error type for engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Operation attempted outside the phase it is valid in
    #[error("Invalid phase: expected {expected}, round is {actual}")]
    InvalidPhase { expected: Phase, actual: Phase },

    /// Non-numeric or non-positive bet fields
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Player already holds an active bet this round
    #[error("Player {0} is already betting this round")]
    DuplicateBet(String),

    #[error("Insufficient balance: {balance} available, {requested} requested")]
    InsufficientBalance { balance: f64, requested: f64 },

    /// Round or player record missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Cashout or settlement re-applied to a finished entry
    #[error("Bet for player {0} is already settled")]
    AlreadySettled(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Storage system errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Configuration and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::WriteFailed(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::CorruptedData(e.to_string())
    }
}

impl EngineError {
    /// Stable machine-readable code used by the HTTP layer
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidPhase { .. } => "INVALID_PHASE",
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::DuplicateBet(_) => "DUPLICATE_BET",
            EngineError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::AlreadySettled(_) => "ALREADY_SETTLED",
            EngineError::Storage(_) => "STORAGE_UNAVAILABLE",
        }
    }
}

// Convenience type alias for Results
pub type EngineResult<T> = Result<T, EngineError>;
