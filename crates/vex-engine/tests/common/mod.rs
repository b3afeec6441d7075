//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vex_core::{AssetSymbol, CandleBar};
use vex_detector::{AlertDeduplicator, DetectorConfig, PhaseAlert};
use vex_engine::config::{BackfillConfig, SyncConfig};
use vex_engine::{Backfiller, CandlePipeline, EngineListener, PoolState, PoolSynchronizer};
use vex_feed::CandleCache;
use vex_registry::{
    MarketDataSource, RegistryError, RegistryResult, Ticker, UniverseFilter,
};
use vex_ws::{ConnectionConfig, ConnectionManager};

pub const HOUR: i64 = 3_600_000;

/// Ticker with no 24h change and the given turnover rank key.
pub fn ticker(inst_id: &str, volume: i64) -> Ticker {
    Ticker {
        inst_id: inst_id.to_string(),
        last: Decimal::ONE,
        open_24h: Decimal::ONE,
        vol_ccy_24h: Decimal::from(volume),
    }
}

/// `count` hourly bars, newest first, each with range 1.
pub fn history(count: i64) -> Vec<CandleBar> {
    (0..count)
        .map(|i| {
            CandleBar::new(
                (count - i) * HOUR,
                Decimal::ONE,
                Decimal::TWO,
                Decimal::ONE,
                Decimal::TWO,
                Decimal::ONE,
            )
        })
        .collect()
}

/// In-memory market with call accounting.
pub struct MemorySource {
    universe: Mutex<Vec<Ticker>>,
    failures_left: AtomicUsize,
    latency: Duration,
    pub universe_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl MemorySource {
    pub fn new(universe: Vec<Ticker>) -> Self {
        Self::with_latency(universe, Duration::from_millis(10))
    }

    pub fn with_latency(universe: Vec<Ticker>, latency: Duration) -> Self {
        Self {
            universe: Mutex::new(universe),
            failures_left: AtomicUsize::new(0),
            latency,
            universe_calls: AtomicUsize::new(0),
            history_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn set_universe(&self, universe: Vec<Ticker>) {
        *self.universe.lock() = universe;
    }

    /// The next `n` universe fetches fail with HTTP 500.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl MarketDataSource for MemorySource {
    async fn fetch_universe(&self) -> RegistryResult<Vec<Ticker>> {
        self.universe_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RegistryError::HttpStatus {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        Ok(self.universe.lock().clone())
    }

    async fn fetch_history(&self, _symbol: &AssetSymbol) -> RegistryResult<Option<Vec<CandleBar>>> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.latency).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Some(history(30)))
    }
}

/// Listener that keeps every log line.
#[derive(Default)]
pub struct RecordingListener {
    pub logs: Mutex<Vec<String>>,
    pub infos: Mutex<Vec<String>>,
    pub alerts: Mutex<Vec<PhaseAlert>>,
}

impl RecordingListener {
    pub fn logged(&self, prefix: &str) -> bool {
        self.logs.lock().iter().any(|l| l.starts_with(prefix))
    }

    pub fn informed(&self, prefix: &str) -> Vec<String> {
        self.infos
            .lock()
            .iter()
            .filter(|l| l.starts_with(prefix))
            .cloned()
            .collect()
    }
}

impl EngineListener for RecordingListener {
    fn on_log(&self, message: &str) {
        self.logs.lock().push(message.to_string());
    }

    fn on_info(&self, message: &str) {
        self.infos.lock().push(message.to_string());
    }

    fn on_status(&self, _running: bool) {}

    fn on_alert(&self, alert: &PhaseAlert) {
        self.alerts.lock().push(alert.clone());
    }
}

/// A synchronizer over `source` with an offline connection manager.
pub struct Harness {
    pub source: Arc<MemorySource>,
    pub listener: Arc<RecordingListener>,
    pub state: PoolState,
    pub sync: PoolSynchronizer<MemorySource>,
}

pub fn harness(source: MemorySource, pool_size: usize, sync_config: SyncConfig) -> Harness {
    let source = Arc::new(source);
    let listener = Arc::new(RecordingListener::default());
    let cache = Arc::new(CandleCache::new());
    let dedup = Arc::new(AlertDeduplicator::new(DetectorConfig::default()));
    let pipeline = Arc::new(CandlePipeline::new(
        cache.clone(),
        dedup.clone(),
        listener.clone(),
    ));
    let state = PoolState {
        pool: Arc::new(dashmap::DashSet::new()),
        cache: cache.clone(),
        dedup,
        connection: ConnectionManager::new(ConnectionConfig::default(), pipeline),
    };
    let backfiller = Backfiller::new(cache, listener.clone(), &BackfillConfig::default());
    let filter = UniverseFilter {
        pool_size,
        ..Default::default()
    };
    let sync = PoolSynchronizer::new(
        source.clone(),
        filter,
        sync_config,
        state.clone(),
        backfiller,
        listener.clone(),
    );
    Harness {
        source,
        listener,
        state,
        sync,
    }
}
