//! Error types for the telemetry engine

use thiserror::Error;

/// Errors raised inside the engine.
///
/// The public tracking API never returns these: capture and persistence
/// failures are logged and dropped at the collector boundary. They surface only
/// from configuration parsing, store construction and the storage read-back
/// helpers.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage quota exceeded writing {key}: {needed} bytes needed, {available} available")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid host signal: {0}")]
    InvalidSignal(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
