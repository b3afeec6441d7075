//! Callbacks to the hosting application.
//!
//! The engine reports through four streams: operational log messages,
//! high-frequency info messages, the running status and alerts. The
//! host decides how to present them.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use vex_detector::PhaseAlert;

/// Receiver for engine events. Called from engine tasks; must not block.
#[cfg_attr(test, mockall::automock)]
pub trait EngineListener: Send + Sync + 'static {
    /// Human-readable operational message.
    fn on_log(&self, message: &str);

    /// Diagnostic message (per-bar status, watch notices).
    fn on_info(&self, message: &str);

    /// Engine running status.
    fn on_status(&self, running: bool);

    fn on_alert(&self, alert: &PhaseAlert);
}

/// Listener that forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl EngineListener for TracingListener {
    fn on_log(&self, message: &str) {
        info!("{message}");
    }

    fn on_info(&self, message: &str) {
        debug!("{message}");
    }

    fn on_status(&self, running: bool) {
        info!(running, "Engine status");
    }

    fn on_alert(&self, alert: &PhaseAlert) {
        let bar_time = DateTime::<Utc>::from_timestamp_millis(alert.bar_ts)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        warn!(
            symbol = %alert.symbol,
            ver = alert.ver,
            intensified = alert.intensified,
            bar_time = %bar_time,
            "Phase alert"
        );
    }
}
