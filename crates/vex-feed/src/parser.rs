//! Candle frame parsing.

use crate::error::{FeedError, FeedResult};
use vex_core::{AssetSymbol, CandleBar};
use vex_ws::DataFrame;

/// One streamed bar for one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleUpdate {
    pub symbol: AssetSymbol,
    pub bar: CandleBar,
}

/// Parse a candle-channel frame. Only the first row of `data` is used;
/// the exchange sends one (possibly still forming) bar per push.
pub fn parse_frame(frame: &DataFrame) -> FeedResult<CandleUpdate> {
    let row = frame
        .data
        .first()
        .ok_or_else(|| FeedError::EmptyData(frame.arg.inst_id.clone()))?;

    let bar = CandleBar::from_row(row).map_err(|source| FeedError::InvalidRow {
        symbol: frame.arg.inst_id.clone(),
        source,
    })?;

    Ok(CandleUpdate {
        symbol: AssetSymbol::new(frame.arg.inst_id.clone()),
        bar,
    })
}
