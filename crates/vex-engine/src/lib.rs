//! vexwatch engine.
//!
//! Orchestrates the monitor:
//! - Candle stream with registry replay and watchdog reconnects
//! - Periodic asset pool synchronization with paced, bounded backfill
//! - Per-bar phase detection and alert deduplication
//! - Host callbacks through [`EngineListener`]

pub mod backfill;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod sync;

pub use backfill::{BackfillOutcome, BackfillReport, Backfiller};
pub use config::AppConfig;
pub use engine::{Engine, EngineState};
pub use error::{AppError, AppResult};
pub use events::{EngineListener, TracingListener};
pub use pipeline::CandlePipeline;
pub use sync::{CycleOutcome, PoolDiff, PoolState, PoolSynchronizer};
