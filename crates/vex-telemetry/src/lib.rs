//! Prometheus metrics and structured logging for vexwatch.
//!
//! - Structured logging with tracing (JSON in production, pretty otherwise)
//! - Process-wide prometheus collectors behind the [`Metrics`] facade

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
