//! Historical bar backfill for newly admitted assets.
//!
//! Requests are admitted one per pacing interval into a fixed pool of
//! permits, so at most `max_inflight` are outstanding while the sustained
//! rate stays under the exchange's per-window burst limit. One asset's
//! failure is logged and counted; it never cancels its siblings.

use crate::config::BackfillConfig;
use crate::events::EngineListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vex_core::AssetSymbol;
use vex_feed::CandleCache;
use vex_registry::{FetchErrorKind, MarketDataSource};
use vex_telemetry::Metrics;

/// Completions between progress lines; the last completion always reports.
const PROGRESS_EVERY: usize = 20;

/// Result of one asset's backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillOutcome {
    /// Bars merged; the series now holds this many.
    Loaded(usize),
    /// Exchange returned no bars.
    Empty,
    /// Asset left the pool while the request was in flight.
    Evicted,
    Failed(FetchErrorKind),
    Cancelled,
}

impl BackfillOutcome {
    fn metric_label(&self) -> Option<&'static str> {
        match self {
            Self::Loaded(_) => Some("ok"),
            Self::Empty => Some("empty"),
            Self::Failed(kind) => Some(kind.as_str()),
            Self::Evicted | Self::Cancelled => None,
        }
    }
}

/// Tally for one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub requested: usize,
    pub loaded: usize,
    pub empty: usize,
    pub evicted: usize,
    pub rate_limited: usize,
    pub timed_out: usize,
    pub failed: usize,
    /// Assets never started or abandoned because of cancellation.
    pub cancelled: usize,
}

impl BackfillReport {
    fn record(&mut self, outcome: BackfillOutcome) {
        match outcome {
            BackfillOutcome::Loaded(_) => self.loaded += 1,
            BackfillOutcome::Empty => self.empty += 1,
            BackfillOutcome::Evicted => self.evicted += 1,
            BackfillOutcome::Failed(FetchErrorKind::RateLimited) => self.rate_limited += 1,
            BackfillOutcome::Failed(FetchErrorKind::Timeout) => self.timed_out += 1,
            BackfillOutcome::Failed(FetchErrorKind::Other) => self.failed += 1,
            BackfillOutcome::Cancelled => self.cancelled += 1,
        }
    }

    pub fn errors(&self) -> usize {
        self.rate_limited + self.timed_out + self.failed
    }

    pub fn summary(&self) -> String {
        format!(
            "Backfill Complete: {}/{} loaded, {} empty, {} errors (rate-limited {}, timeout {})",
            self.loaded,
            self.requested,
            self.empty,
            self.errors(),
            self.rate_limited,
            self.timed_out
        )
    }
}

/// Paced, permit-bounded backfill runner. Cheap to clone; clones share
/// the permit pool.
#[derive(Clone)]
pub struct Backfiller {
    cache: Arc<CandleCache>,
    listener: Arc<dyn EngineListener>,
    permits: Arc<Semaphore>,
    pace: Duration,
}

impl Backfiller {
    pub fn new(
        cache: Arc<CandleCache>,
        listener: Arc<dyn EngineListener>,
        config: &BackfillConfig,
    ) -> Self {
        Self {
            cache,
            listener,
            permits: Arc::new(Semaphore::new(config.max_inflight.max(1))),
            pace: config.pace(),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Backfill `symbols` and wait for every started request to finish.
    pub async fn run<S: MarketDataSource>(
        &self,
        source: &Arc<S>,
        symbols: Vec<AssetSymbol>,
        cancel: &CancellationToken,
    ) -> BackfillReport {
        let total = symbols.len();
        let mut report = BackfillReport {
            requested: total,
            ..Default::default()
        };
        if total == 0 {
            return report;
        }

        info!(total, "Backfill started");
        self.listener.on_info(&format!("Backfill Start: {total} assets"));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();
        let mut launched = 0;

        for symbol in symbols {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.pace) => {}
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let source = Arc::clone(source);
            let cache = Arc::clone(&self.cache);
            let listener = Arc::clone(&self.listener);
            let completed = Arc::clone(&completed);
            let cancel = cancel.clone();
            launched += 1;

            tasks.spawn(async move {
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => BackfillOutcome::Cancelled,
                    outcome = fetch_one(source.as_ref(), &cache, listener.as_ref(), &symbol) => outcome,
                };
                drop(permit);

                if let Some(label) = outcome.metric_label() {
                    Metrics::backfill(label);
                }
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if done % PROGRESS_EVERY == 0 || done == total {
                    debug!(done, total, "Backfill progress");
                    listener.on_info(&format!("Backfill Progress: {done}/{total}"));
                }
                outcome
            });
        }

        report.cancelled += total - launched;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    warn!(error = %e, "Backfill task aborted");
                    report.failed += 1;
                }
            }
        }

        info!(
            loaded = report.loaded,
            empty = report.empty,
            errors = report.errors(),
            cancelled = report.cancelled,
            total,
            "Backfill Complete"
        );
        report
    }
}

async fn fetch_one<S: MarketDataSource>(
    source: &S,
    cache: &CandleCache,
    listener: &dyn EngineListener,
    symbol: &AssetSymbol,
) -> BackfillOutcome {
    match source.fetch_history(symbol).await {
        Ok(Some(bars)) => match cache.merge_backfill(symbol.as_str(), &bars) {
            Some(len) => {
                debug!(symbol = %symbol, fetched = bars.len(), len, "Backfilled");
                BackfillOutcome::Loaded(len)
            }
            None => {
                debug!(symbol = %symbol, "Asset evicted before backfill landed");
                BackfillOutcome::Evicted
            }
        },
        Ok(None) => {
            debug!(symbol = %symbol, "No history available");
            BackfillOutcome::Empty
        }
        Err(e) => {
            let kind = e.kind();
            warn!(symbol = %symbol, kind = %kind, error = %e, "Backfill failed");
            listener.on_log(&format!("Backfill Fail [{symbol}] {kind}: {e}"));
            BackfillOutcome::Failed(kind)
        }
    }
}
