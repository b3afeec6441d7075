//! Tradable universe selection.

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;
use vex_core::AssetSymbol;

/// One entry of the ticker list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Ticker {
    #[serde(rename = "instId")]
    pub inst_id: String,
    pub last: Decimal,
    #[serde(rename = "open24h")]
    pub open_24h: Decimal,
    /// 24h volume in base currency.
    #[serde(rename = "volCcy24h")]
    pub vol_ccy_24h: Decimal,
}

impl Ticker {
    /// 24h turnover in quote currency.
    pub fn turnover(&self) -> Decimal {
        self.vol_ccy_24h * self.last
    }

    /// Absolute 24h change as a fraction of the open. `None` when open is zero.
    pub fn change_24h(&self) -> Option<Decimal> {
        if self.open_24h.is_zero() {
            return None;
        }
        Some(((self.last - self.open_24h) / self.open_24h).abs())
    }
}

/// Universe filter parameters.
#[derive(Debug, Clone)]
pub struct UniverseFilter {
    pub pool_size: usize,
    /// Assets that moved more than this fraction in 24h are excluded.
    pub max_change_24h: Decimal,
    /// Base currencies whose pairs are excluded (e.g. "USDC" drops "USDC-USDT-SWAP").
    pub stablecoin_bases: Vec<String>,
}

impl Default for UniverseFilter {
    fn default() -> Self {
        Self {
            pool_size: 120,
            max_change_24h: Decimal::new(30, 2),
            stablecoin_bases: ["USDT", "USDC", "DAI", "FDUSD", "TUSD"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl UniverseFilter {
    fn is_stablecoin_pair(&self, inst_id: &str) -> bool {
        self.stablecoin_bases.iter().any(|base| {
            inst_id.len() > base.len()
                && inst_id.starts_with(base.as_str())
                && inst_id.as_bytes()[base.len()] == b'-'
        })
    }
}

/// Filter and rank tickers, returning at most `pool_size` symbols ordered
/// by 24h turnover, highest first.
pub fn select_universe(tickers: &[Ticker], filter: &UniverseFilter) -> Vec<AssetSymbol> {
    let mut ranked: Vec<(&Ticker, Decimal)> = tickers
        .iter()
        .filter(|t| !filter.is_stablecoin_pair(&t.inst_id))
        .filter(|t| match t.change_24h() {
            Some(change) => change <= filter.max_change_24h,
            None => {
                debug!(symbol = %t.inst_id, "Skipping ticker with zero open");
                false
            }
        })
        .map(|t| (t, t.turnover()))
        .collect();

    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.inst_id.cmp(&b.0.inst_id)));
    ranked
        .into_iter()
        .take(filter.pool_size)
        .map(|(t, _)| AssetSymbol::new(t.inst_id.clone()))
        .collect()
}
