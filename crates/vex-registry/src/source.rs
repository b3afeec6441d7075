//! Market data source seam.

use crate::client::MarketClient;
use crate::error::RegistryResult;
use crate::universe::Ticker;
use std::future::Future;
use vex_core::{AssetSymbol, CandleBar};

/// Where the engine gets its universe and candle history from.
pub trait MarketDataSource: Send + Sync + 'static {
    /// Current ticker list for the configured instrument type.
    fn fetch_universe(&self) -> impl Future<Output = RegistryResult<Vec<Ticker>>> + Send;

    /// Recent bars for one asset. `Ok(None)` means the exchange had nothing.
    fn fetch_history(
        &self,
        symbol: &AssetSymbol,
    ) -> impl Future<Output = RegistryResult<Option<Vec<CandleBar>>>> + Send;
}

/// [`MarketDataSource`] backed by the REST API.
#[derive(Clone)]
pub struct RestMarketSource {
    client: MarketClient,
    inst_type: String,
    bar: String,
    limit: u32,
}

impl RestMarketSource {
    pub fn new(
        client: MarketClient,
        inst_type: impl Into<String>,
        bar: impl Into<String>,
        limit: u32,
    ) -> Self {
        Self {
            client,
            inst_type: inst_type.into(),
            bar: bar.into(),
            limit,
        }
    }

    pub fn client(&self) -> &MarketClient {
        &self.client
    }
}

impl MarketDataSource for RestMarketSource {
    async fn fetch_universe(&self) -> RegistryResult<Vec<Ticker>> {
        self.client.fetch_tickers(&self.inst_type).await
    }

    async fn fetch_history(&self, symbol: &AssetSymbol) -> RegistryResult<Option<Vec<CandleBar>>> {
        self.client
            .fetch_candles(symbol.as_str(), &self.bar, self.limit)
            .await
    }
}
