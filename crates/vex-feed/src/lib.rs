//! Candle feed for vexwatch.
//!
//! Turns candle-channel frames into typed bars and keeps a bounded,
//! newest-first series per asset that both the stream and the historical
//! backfill merge into.

pub mod candle_cache;
pub mod error;
pub mod parser;

pub use candle_cache::{CandleCache, StreamMerge};
pub use error::{FeedError, FeedResult};
pub use parser::{parse_frame, CandleUpdate};
