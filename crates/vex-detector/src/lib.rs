//! Volatility phase detection for vexwatch.
//!
//! [`analyze`] scores a newest-first bar series: IC is the current bar's
//! range, NB the mean range of the 24 bars before it, and VER = IC / NB.
//! [`AlertDeduplicator`] turns readings into at most one alert per bar
//! (plus intensification re-alerts) and sub-threshold watch notices.

pub mod config;
pub mod dedup;
pub mod error;
pub mod phase;

pub use config::DetectorConfig;
pub use dedup::{AlertDeduplicator, PhaseAlert, Verdict, WatchNotice};
pub use error::{DetectorError, DetectorResult};
pub use phase::{analyze, PhaseReading, BASELINE_BARS, MIN_BARS};
