//! Registry error types.

use std::fmt;
use thiserror::Error;

/// Coarse classification used for backfill logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    RateLimited,
    Timeout,
    Other,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::Other => "failed",
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("API error {code}: {msg}")]
    Api { code: String, msg: String },

    #[error("Missing data in {0} response")]
    MissingData(&'static str),

    #[error("Request limiter closed")]
    LimiterClosed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RegistryError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::HttpStatus { status: 429, .. } => FetchErrorKind::RateLimited,
            Self::HttpStatus { body, .. } | Self::Api { msg: body, .. }
                if body.contains("Too Many Requests") =>
            {
                FetchErrorKind::RateLimited
            }
            Self::Request(e) if e.is_timeout() => FetchErrorKind::Timeout,
            Self::Request(e) if e.status().map(|s| s.as_u16()) == Some(429) => {
                FetchErrorKind::RateLimited
            }
            other => {
                let text = other.to_string().to_ascii_lowercase();
                if text.contains("timeout") || text.contains("timed out") {
                    FetchErrorKind::Timeout
                } else {
                    FetchErrorKind::Other
                }
            }
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
