//! Asset pool synchronizer.
//!
//! Periodically re-ranks the tradable universe and moves the pool toward
//! it: removed assets are unsubscribed and forgotten before new ones are
//! admitted, subscribed and backfilled.

use crate::backfill::{BackfillReport, Backfiller};
use crate::config::SyncConfig;
use crate::error::AppResult;
use crate::events::EngineListener;
use dashmap::DashSet;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vex_core::AssetSymbol;
use vex_detector::AlertDeduplicator;
use vex_feed::CandleCache;
use vex_registry::{select_universe, MarketDataSource, UniverseFilter};
use vex_telemetry::Metrics;
use vex_ws::ConnectionManager;

const PREVIEW_LIMIT: usize = 5;

/// Membership change between the current pool and a ranked target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolDiff {
    /// In target rank order.
    pub added: Vec<AssetSymbol>,
    pub kept: Vec<AssetSymbol>,
    /// Sorted.
    pub removed: Vec<AssetSymbol>,
}

impl PoolDiff {
    pub fn compute<'a>(
        current: impl IntoIterator<Item = &'a AssetSymbol>,
        target: &[AssetSymbol],
    ) -> Self {
        let current: HashSet<&AssetSymbol> = current.into_iter().collect();
        let wanted: HashSet<&AssetSymbol> = target.iter().collect();

        let mut diff = Self::default();
        for symbol in target {
            if current.contains(symbol) {
                diff.kept.push(symbol.clone());
            } else {
                diff.added.push(symbol.clone());
            }
        }
        diff.removed = current
            .into_iter()
            .filter(|s| !wanted.contains(s))
            .cloned()
            .collect();
        diff.removed.sort();
        diff
    }

    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Pool Analysis: Keep={} | +{} | -{}",
            self.kept.len(),
            self.added.len(),
            self.removed.len()
        )
    }
}

/// At most five names, then a count of the rest.
pub fn preview(symbols: &[AssetSymbol]) -> String {
    let shown: Vec<&str> = symbols
        .iter()
        .take(PREVIEW_LIMIT)
        .map(AssetSymbol::as_str)
        .collect();
    let mut out = shown.join(", ");
    if symbols.len() > PREVIEW_LIMIT {
        out.push_str(&format!(" ... (+{})", symbols.len() - PREVIEW_LIMIT));
    }
    out
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Filtered universe was empty; pool left as is.
    EmptyUniverse,
    /// Shutdown arrived mid-cycle.
    Cancelled,
    Applied {
        diff: PoolDiff,
        backfill: BackfillReport,
    },
}

/// Shared state the synchronizer mutates.
#[derive(Clone)]
pub struct PoolState {
    pub pool: Arc<DashSet<AssetSymbol>>,
    pub cache: Arc<CandleCache>,
    pub dedup: Arc<AlertDeduplicator>,
    pub connection: ConnectionManager,
}

pub struct PoolSynchronizer<S> {
    source: Arc<S>,
    filter: UniverseFilter,
    config: SyncConfig,
    state: PoolState,
    backfiller: Backfiller,
    listener: Arc<dyn EngineListener>,
}

impl<S: MarketDataSource> PoolSynchronizer<S> {
    pub fn new(
        source: Arc<S>,
        filter: UniverseFilter,
        config: SyncConfig,
        state: PoolState,
        backfiller: Backfiller,
        listener: Arc<dyn EngineListener>,
    ) -> Self {
        Self {
            source,
            filter,
            config,
            state,
            backfiller,
            listener,
        }
    }

    /// Run cycles until cancelled. A failed cycle is retried after the
    /// shorter cooldown; the loop never exits on error.
    pub async fn run(self, cancel: CancellationToken) {
        if !sleep_or_cancel(self.config.initial_delay(), &cancel).await {
            return;
        }

        loop {
            let wait = match self.run_cycle(&cancel).await {
                Ok(CycleOutcome::Cancelled) => break,
                Ok(_) => {
                    Metrics::sync_cycle(true);
                    self.config.period()
                }
                Err(e) => {
                    Metrics::sync_cycle(false);
                    warn!(error = %e, retry_secs = self.config.retry_secs, "Pool sync failed");
                    self.listener.on_log(&format!(
                        "Pool sync failed: {e}. Retrying in {}s",
                        self.config.retry_secs
                    ));
                    self.config.retry()
                }
            };

            if !sleep_or_cancel(wait, &cancel).await {
                break;
            }
        }
        debug!("Pool synchronizer stopped");
    }

    /// One fetch-rank-diff-apply pass. Every await races `cancel`.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> AppResult<CycleOutcome> {
        let tickers = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(CycleOutcome::Cancelled),
            fetched = self.source.fetch_universe() => fetched?,
        };
        let target = select_universe(&tickers, &self.filter);
        if target.is_empty() {
            warn!(tickers = tickers.len(), "Filtered universe is empty, pool unchanged");
            self.listener
                .on_log("Universe empty after filtering; keeping current pool");
            return Ok(CycleOutcome::EmptyUniverse);
        }

        let current: Vec<AssetSymbol> = self.state.pool.iter().map(|s| s.key().clone()).collect();
        let diff = PoolDiff::compute(&current, &target);
        info!(
            keep = diff.kept.len(),
            added = diff.added.len(),
            removed = diff.removed.len(),
            "Pool analysis"
        );
        self.listener.on_log(&diff.summary());

        if !diff.removed.is_empty() {
            self.listener
                .on_log(&format!("Removing: {}", preview(&diff.removed)));
            if !self.remove(&diff.removed, cancel).await {
                return Ok(CycleOutcome::Cancelled);
            }
        }

        let mut backfill = BackfillReport::default();
        if !diff.added.is_empty() {
            self.listener
                .on_log(&format!("Adding: {}", preview(&diff.added)));
            if !self.admit(&diff.added, cancel).await {
                return Ok(CycleOutcome::Cancelled);
            }
            backfill = self
                .backfiller
                .run(&self.source, diff.added.clone(), cancel)
                .await;
            self.listener.on_log(&backfill.summary());
        }

        Metrics::pool_size(self.state.pool.len());
        Ok(CycleOutcome::Applied { diff, backfill })
    }

    /// Local state is dropped even if the unsubscribe send is cut short;
    /// the registry already forgot the symbols. `false` if cancelled.
    async fn remove(&self, symbols: &[AssetSymbol], cancel: &CancellationToken) -> bool {
        let sent = run_or_cancel(self.state.connection.unsubscribe(symbols), cancel).await;
        for symbol in symbols {
            self.state.pool.remove(symbol.as_str());
            // Cache first: evict returns only after in-flight detection for
            // the asset is done, so nothing re-creates its dedup state.
            self.state.cache.evict(symbol.as_str());
            self.state.dedup.evict(symbol.as_str());
        }
        sent
    }

    /// `false` if cancelled before the subscribe requests went out.
    async fn admit(&self, symbols: &[AssetSymbol], cancel: &CancellationToken) -> bool {
        for symbol in symbols {
            self.state.cache.admit(symbol);
            self.state.pool.insert(symbol.clone());
        }
        run_or_cancel(self.state.connection.subscribe(symbols), cancel).await
    }
}

/// `false` if cancelled first.
async fn run_or_cancel<F: std::future::Future>(work: F, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = work => true,
    }
}

async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    run_or_cancel(tokio::time::sleep(duration), cancel).await
}
