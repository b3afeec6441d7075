//! Stream handler: parse, merge, detect, deduplicate.
//!
//! Detection runs inside the per-asset cache lock, so readings for one
//! asset are strictly ordered with its merges. Listener callbacks run
//! after the lock is released.

use crate::events::EngineListener;
use std::sync::Arc;
use tracing::{debug, trace};
use vex_detector::{analyze, AlertDeduplicator, Verdict};
use vex_feed::{parse_frame, CandleCache, CandleUpdate, FeedError};
use vex_telemetry::Metrics;
use vex_ws::{DataFrame, FrameHandler};

pub struct CandlePipeline {
    cache: Arc<CandleCache>,
    dedup: Arc<AlertDeduplicator>,
    listener: Arc<dyn EngineListener>,
}

impl CandlePipeline {
    pub fn new(
        cache: Arc<CandleCache>,
        dedup: Arc<AlertDeduplicator>,
        listener: Arc<dyn EngineListener>,
    ) -> Self {
        Self {
            cache,
            dedup,
            listener,
        }
    }

    /// Merge one bar and evaluate the asset.
    ///
    /// Returns `None` when the asset is not in the pool.
    pub fn process(&self, update: CandleUpdate) -> Option<Verdict> {
        let threshold = self.dedup.config().ver_threshold;
        let CandleUpdate { symbol, bar } = update;

        let verdict = self
            .cache
            .merge_stream(symbol.as_str(), bar, |merge, bars| {
                let reading = analyze(bars, threshold);
                trace!(
                    symbol = %symbol,
                    ?merge,
                    bars = bars.len(),
                    ver = reading.ver,
                    "Bar merged"
                );
                self.dedup.evaluate(&symbol, &reading)
            });

        let Some(verdict) = verdict else {
            Metrics::frame("ignored");
            return None;
        };
        Metrics::frame("candle");

        match &verdict {
            Verdict::Alert(alert) => {
                Metrics::alert(alert.intensified);
                self.listener.on_log(&alert.log_line());
                self.listener.on_alert(alert);
            }
            Verdict::Watch(notice) => {
                Metrics::watch();
                self.listener.on_info(&notice.log_line());
            }
            Verdict::Suppressed => {
                debug!(symbol = %symbol, "Alert suppressed for current bar");
            }
            Verdict::Quiet => {}
        }
        Some(verdict)
    }
}

impl FrameHandler for CandlePipeline {
    fn on_frame(&self, frame: DataFrame) {
        match parse_frame(&frame) {
            Ok(update) => {
                self.process(update);
            }
            Err(FeedError::EmptyData(symbol)) => {
                trace!(symbol, "Candle frame without rows");
                Metrics::frame("ignored");
            }
            Err(e) => {
                debug!(error = %e, "Dropping malformed candle frame");
                Metrics::frame("malformed");
            }
        }
    }
}
