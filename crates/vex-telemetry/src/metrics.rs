//! Prometheus metrics for vexwatch.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`: a failure means a duplicate metric
//! name, which is a startup bug. It can only happen during static
//! initialization.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_gauge, register_gauge_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge,
    TextEncoder,
};

/// Stream connection state (1 = connected).
pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("vex_ws_connected", "Stream connection state (1=connected)").unwrap()
});

/// Connection state machine, one series per state.
pub static WS_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "vex_ws_state",
        "Stream connection state machine (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

pub static WS_RECONNECT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("vex_ws_reconnect_total", "Total reconnect attempts").unwrap()
});

/// Inbound data frames. Labels: kind (candle/malformed/ignored)
pub static FRAMES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("vex_frames_total", "Inbound data frames", &["kind"]).unwrap()
});

/// Alerts fired. Labels: kind (new/intensified)
pub static ALERTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("vex_alerts_total", "Phase alerts fired", &["kind"]).unwrap()
});

pub static WATCH_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("vex_watch_total", "Sub-threshold watch notices").unwrap()
});

pub static POOL_SIZE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("vex_pool_size", "Assets currently in the pool").unwrap()
});

/// Backfill requests. Labels: outcome (ok/empty/rate_limited/timeout/failed)
pub static BACKFILL_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "vex_backfill_total",
        "Historical candle fetches by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Pool synchronizer cycles. Labels: result (ok/error)
pub static SYNC_CYCLES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "vex_sync_cycles_total",
        "Pool synchronizer cycles",
        &["result"]
    )
    .unwrap()
});

const WS_STATES: [&str; 5] = [
    "disconnected",
    "connecting",
    "connected",
    "reconnect_pending",
    "user_terminated",
];

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Set the active connection state; all others go to 0.
    pub fn ws_state_set(state: &str) {
        for s in WS_STATES {
            WS_STATE.with_label_values(&[s]).set(0.0);
        }
        WS_STATE.with_label_values(&[state]).set(1.0);
        WS_CONNECTED.set(if state == "connected" { 1.0 } else { 0.0 });
    }

    pub fn ws_reconnect() {
        WS_RECONNECT_TOTAL.inc();
    }

    pub fn frame(kind: &str) {
        FRAMES_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn alert(intensified: bool) {
        let kind = if intensified { "intensified" } else { "new" };
        ALERTS_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn watch() {
        WATCH_TOTAL.inc();
    }

    pub fn pool_size(size: usize) {
        POOL_SIZE.set(size as i64);
    }

    pub fn backfill(outcome: &str) {
        BACKFILL_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn sync_cycle(ok: bool) {
        SYNC_CYCLES_TOTAL
            .with_label_values(&[if ok { "ok" } else { "error" }])
            .inc();
    }

    /// Render the default registry in the text exposition format.
    pub fn render() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}
