//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Empty data array for {0}")]
    EmptyData(String),

    #[error("Invalid candle row for {symbol}: {source}")]
    InvalidRow {
        symbol: String,
        #[source]
        source: vex_core::CoreError,
    },
}

pub type FeedResult<T> = Result<T, FeedError>;
