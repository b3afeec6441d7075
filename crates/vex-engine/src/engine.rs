//! Engine lifecycle.
//!
//! [`Engine`] owns every long-lived component and the root cancellation
//! token. `start` moves Stopped to Running; `stop` moves Running to
//! Stopped. The pool, cache and subscription registry survive a stop so
//! a later start resumes where it left off.

use crate::backfill::Backfiller;
use crate::config::AppConfig;
use crate::error::AppResult;
use crate::events::EngineListener;
use crate::pipeline::CandlePipeline;
use crate::sync::{PoolState, PoolSynchronizer};
use dashmap::DashSet;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vex_core::AssetSymbol;
use vex_detector::AlertDeduplicator;
use vex_feed::CandleCache;
use vex_registry::{MarketDataSource, UniverseFilter};
use vex_telemetry::Metrics;
use vex_ws::{ConnectionManager, ConnectionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Running,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::Running => f.write_str("running"),
        }
    }
}

struct Runtime {
    state: EngineState,
    cancel: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct Engine<S: MarketDataSource> {
    config: AppConfig,
    filter: UniverseFilter,
    source: Arc<S>,
    listener: Arc<dyn EngineListener>,
    pool: PoolState,
    backfiller: Backfiller,
    runtime: Mutex<Runtime>,
}

impl<S: MarketDataSource> Engine<S> {
    /// Build the engine. Nothing runs until [`start`](Self::start).
    pub fn new(
        config: AppConfig,
        source: S,
        listener: Arc<dyn EngineListener>,
    ) -> AppResult<Self> {
        config.validate()?;
        let filter = config.universe_filter()?;

        let cache = Arc::new(CandleCache::new());
        let dedup = Arc::new(AlertDeduplicator::new(config.detector.clone()));
        let pipeline = Arc::new(CandlePipeline::new(
            cache.clone(),
            dedup.clone(),
            listener.clone(),
        ));
        let connection = ConnectionManager::new(config.connection_config(), pipeline);
        let backfiller = Backfiller::new(cache.clone(), listener.clone(), &config.backfill);

        Ok(Self {
            filter,
            source: Arc::new(source),
            listener,
            pool: PoolState {
                pool: Arc::new(DashSet::new()),
                cache,
                dedup,
                connection,
            },
            backfiller,
            runtime: Mutex::new(Runtime {
                state: EngineState::Stopped,
                cancel: None,
                tasks: Vec::new(),
            }),
            config,
        })
    }

    pub fn state(&self) -> EngineState {
        self.runtime.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.pool.connection.state()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.pool.connection
    }

    pub fn cache(&self) -> &CandleCache {
        &self.pool.cache
    }

    /// Current pool members, sorted.
    pub fn pool(&self) -> Vec<AssetSymbol> {
        let mut members: Vec<_> = self.pool.pool.iter().map(|s| s.key().clone()).collect();
        members.sort();
        members
    }

    /// Start streaming and pool synchronization.
    ///
    /// When already running, only re-asserts the stream connection.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut runtime = self.runtime.lock();

        if runtime.state == EngineState::Running {
            info!("Engine already running, re-asserting stream connection");
            self.listener.on_log("Engine already running; reconnecting stream");
            self.listener.on_status(true);
            self.pool.connection.connect();
            return;
        }

        let cancel = CancellationToken::new();
        self.pool.connection.connect();

        let synchronizer = PoolSynchronizer::new(
            self.source.clone(),
            self.filter.clone(),
            self.config.sync.clone(),
            self.pool.clone(),
            self.backfiller.clone(),
            self.listener.clone(),
        );
        runtime
            .tasks
            .push(tokio::spawn(synchronizer.run(cancel.child_token())));
        runtime.tasks.push(tokio::spawn(relay_state(
            self.pool.connection.state_watch(),
            self.listener.clone(),
            cancel.child_token(),
        )));

        runtime.cancel = Some(cancel);
        runtime.state = EngineState::Running;
        drop(runtime);

        info!(
            threshold = self.config.detector.ver_threshold,
            pool_size = self.config.sync.pool_size,
            "Engine started"
        );
        self.listener.on_log("Engine started");
        self.listener.on_status(true);
    }

    /// Cancel background work, close the stream and wait for tasks to exit.
    pub async fn stop(&self) {
        let (cancel, tasks) = {
            let mut runtime = self.runtime.lock();
            if runtime.state == EngineState::Stopped {
                return;
            }
            runtime.state = EngineState::Stopped;
            (runtime.cancel.take(), std::mem::take(&mut runtime.tasks))
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        self.pool.connection.disconnect();

        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Engine task ended abnormally");
            }
        }

        info!("Engine stopped");
        self.listener.on_log("Engine stopped");
        self.listener.on_status(false);
    }
}

/// Forward connection transitions to the listener and metrics.
async fn relay_state(
    mut rx: watch::Receiver<ConnectionState>,
    listener: Arc<dyn EngineListener>,
    cancel: CancellationToken,
) {
    let mut previous = *rx.borrow_and_update();
    Metrics::ws_state_set(&previous.to_string());

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let state = *rx.borrow_and_update();
        if state == previous {
            continue;
        }
        Metrics::ws_state_set(&state.to_string());
        listener.on_info(&format!("Stream {previous} -> {state}"));

        match state {
            ConnectionState::Connected => listener.on_log("Stream connected"),
            ConnectionState::ReconnectPending => {
                Metrics::ws_reconnect();
                listener.on_log("Stream lost, reconnect scheduled");
            }
            ConnectionState::UserTerminated => listener.on_log("Stream closed"),
            ConnectionState::Disconnected | ConnectionState::Connecting => {}
        }
        previous = state;
    }
    debug!("State relay stopped");
}
