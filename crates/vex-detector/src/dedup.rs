//! Alert deduplication.
//!
//! At most one alert per asset per bar, except that a reading on the same
//! bar whose VER exceeds the last alerted VER by the intensify ratio fires
//! again as an intensification. Non-triggered readings near the threshold
//! produce one watch notice per asset per bar.

use crate::config::DetectorConfig;
use crate::phase::PhaseReading;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::trace;
use vex_core::AssetSymbol;

/// Alert payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseAlert {
    pub symbol: AssetSymbol,
    pub ver: f64,
    pub price: Decimal,
    pub ic: Decimal,
    pub nb: Decimal,
    pub bar_ts: i64,
    /// Re-alert on the same bar with a stronger VER.
    pub intensified: bool,
}

impl PhaseAlert {
    pub fn log_line(&self) -> String {
        format!(
            "!!! ALERT [{}] {}VER: {:.2} | Price: {} | IC: {:.2} | NB: {:.2} !!!",
            self.symbol,
            if self.intensified { "[UP] " } else { "" },
            self.ver,
            self.price,
            self.ic,
            self.nb
        )
    }
}

/// Sub-threshold reading worth logging.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchNotice {
    pub symbol: AssetSymbol,
    pub ver: f64,
    pub ic: Decimal,
    pub nb: Decimal,
    pub bar_ts: i64,
}

impl WatchNotice {
    pub fn log_line(&self) -> String {
        format!(
            "Watch [{}]: VER={:.2} (IC={:.2}, NB={:.2})",
            self.symbol, self.ver, self.ic, self.nb
        )
    }
}

/// What to do with one reading.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Alert(PhaseAlert),
    Watch(WatchNotice),
    /// Triggered, but already alerted for this bar.
    Suppressed,
    Quiet,
}

#[derive(Debug, Clone, Copy)]
struct AlertState {
    bar_ts: i64,
    ver: f64,
}

/// Per-asset alert and watch state.
pub struct AlertDeduplicator {
    config: DetectorConfig,
    intensify: Decimal,
    alerts: DashMap<AssetSymbol, AlertState>,
    watches: DashMap<AssetSymbol, i64>,
}

impl AlertDeduplicator {
    pub fn new(config: DetectorConfig) -> Self {
        let intensify = Decimal::try_from(config.intensify_ratio).unwrap_or(Decimal::ONE);
        Self {
            config,
            intensify,
            alerts: DashMap::new(),
            watches: DashMap::new(),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn evaluate(&self, symbol: &AssetSymbol, reading: &PhaseReading) -> Verdict {
        if reading.triggered {
            self.evaluate_trigger(symbol, reading)
        } else {
            self.evaluate_watch(symbol, reading)
        }
    }

    fn evaluate_trigger(&self, symbol: &AssetSymbol, reading: &PhaseReading) -> Verdict {
        let intensified = match self.alerts.entry(symbol.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(AlertState {
                    bar_ts: reading.bar_ts,
                    ver: reading.ver,
                });
                false
            }
            Entry::Occupied(mut slot) => {
                let last = *slot.get();
                let same_bar = last.bar_ts == reading.bar_ts;
                if same_bar && self.below_intensify(reading.ver, last.ver) {
                    trace!(symbol = %symbol, ver = reading.ver, last = last.ver, "Below intensify level");
                    return Verdict::Suppressed;
                }
                slot.insert(AlertState {
                    bar_ts: reading.bar_ts,
                    ver: reading.ver,
                });
                same_bar
            }
        };

        Verdict::Alert(PhaseAlert {
            symbol: symbol.clone(),
            ver: reading.ver,
            price: reading.price,
            ic: reading.ic,
            nb: reading.nb,
            bar_ts: reading.bar_ts,
            intensified,
        })
    }

    /// Compared in decimal: `3.0 * 1.2` is `3.5999999999999996` in f64, which
    /// would let an exact 20% rise through.
    fn below_intensify(&self, ver: f64, last: f64) -> bool {
        match (Decimal::try_from(ver), Decimal::try_from(last)) {
            (Ok(ver), Ok(last)) => last
                .checked_mul(self.intensify)
                .is_some_and(|level| ver <= level),
            _ => ver <= last * self.config.intensify_ratio,
        }
    }

    fn evaluate_watch(&self, symbol: &AssetSymbol, reading: &PhaseReading) -> Verdict {
        if reading.ver < self.config.watch_level() {
            return Verdict::Quiet;
        }
        let previous = self.watches.insert(symbol.clone(), reading.bar_ts);
        if previous == Some(reading.bar_ts) {
            return Verdict::Quiet;
        }
        Verdict::Watch(WatchNotice {
            symbol: symbol.clone(),
            ver: reading.ver,
            ic: reading.ic,
            nb: reading.nb,
            bar_ts: reading.bar_ts,
        })
    }

    /// Forget all state for an asset leaving the pool.
    pub fn evict(&self, symbol: &str) {
        self.alerts.remove(symbol);
        self.watches.remove(symbol);
    }

    /// (bar timestamp, VER) of the last alert.
    pub fn last_alert(&self, symbol: &str) -> Option<(i64, f64)> {
        self.alerts.get(symbol).map(|s| (s.bar_ts, s.ver))
    }

    pub fn tracked(&self) -> usize {
        self.alerts.len()
    }
}
