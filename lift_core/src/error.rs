//! Error types for the lift_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for lift_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing referenced lift max, malformed strategy or scheme
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation not allowed in the current enrollment/session state
    #[error("State error: {0}")]
    State(String),

    /// Program, week, day, prescription or session could not be resolved
    #[error("Not found: {0}")]
    NotFound(String),

    /// A lift max or failure counter changed underneath a pending write
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for errors the caller can recover from by issuing another command
    /// (for example `next_cycle` after a `State` error between cycles).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::State(_) | Error::ConcurrencyConflict(_))
    }
}
