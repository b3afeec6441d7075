//! Market discovery for vexwatch.
//!
//! - [`MarketClient`]: REST client with a per-host concurrency cap and fixed timeout
//! - [`select_universe`]: stablecoin/volatility filter and turnover ranking
//! - [`MarketDataSource`]: the seam the engine fetches through, so tests can
//!   substitute an in-memory source

pub mod client;
pub mod error;
pub mod source;
pub mod universe;

pub use client::{ClientConfig, MarketClient};
pub use error::{FetchErrorKind, RegistryError, RegistryResult};
pub use source::{MarketDataSource, RestMarketSource};
pub use universe::{select_universe, Ticker, UniverseFilter};
