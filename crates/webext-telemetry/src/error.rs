//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur while configuring telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The log configuration is invalid (bad filter directive, unusable path).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A global subscriber is already installed or could not be installed.
    #[error("Initialization error: {0}")]
    InitError(String),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
