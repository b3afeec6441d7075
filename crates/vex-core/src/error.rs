//! Error types for vex-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Malformed candle row: {0}")]
    MalformedRow(String),

    #[error("Invalid number in field {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
