//! Core domain types for vexwatch.
//!
//! This crate provides fundamental types used throughout the monitor:
//! - `AssetSymbol`: Opaque instrument identifier, the key of every per-asset map
//! - `CandleBar`: Immutable OHLCV bar with exact decimal prices
//! - `CANDLE_CAPACITY`: Bars retained per asset

pub mod candle;
pub mod error;
pub mod symbol;

pub use candle::{CandleBar, CANDLE_CAPACITY};
pub use error::{CoreError, Result};
pub use symbol::AssetSymbol;
