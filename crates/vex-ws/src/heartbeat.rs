//! Frame watchdog for WebSocket sessions.
//!
//! The session pings on a fixed interval. Any inbound frame counts as
//! liveness; if none arrives within 1.5x the ping interval the session
//! is considered dead.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Liveness tracker for one session.
pub struct Watchdog {
    interval: Duration,
    stale_after: Duration,
    last_frame: Mutex<Instant>,
    last_ping: Mutex<Option<Instant>>,
}

impl Watchdog {
    /// Create a watchdog for the given ping interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            stale_after: interval * 3 / 2,
            last_frame: Mutex::new(Instant::now()),
            last_ping: Mutex::new(None),
        }
    }

    /// Reset state (called on open).
    pub fn reset(&self) {
        *self.last_frame.lock() = Instant::now();
        *self.last_ping.lock() = None;
    }

    /// Record that a frame of any kind arrived.
    pub fn record_frame(&self) {
        *self.last_frame.lock() = Instant::now();
    }

    pub fn record_ping(&self) {
        *self.last_ping.lock() = Some(Instant::now());
        debug!("Heartbeat: ping sent");
    }

    pub fn since_last_frame(&self) -> Duration {
        self.last_frame.lock().elapsed()
    }

    /// True when no frame has arrived for longer than 1.5x the interval.
    pub fn is_stale(&self) -> bool {
        self.since_last_frame() > self.stale_after
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    pub fn stats(&self) -> WatchdogStats {
        WatchdogStats {
            since_last_frame_ms: self.since_last_frame().as_millis() as u64,
            since_last_ping_ms: self.last_ping.lock().map(|t| t.elapsed().as_millis() as u64),
            stale: self.is_stale(),
        }
    }
}

/// Watchdog statistics.
#[derive(Debug, Clone)]
pub struct WatchdogStats {
    pub since_last_frame_ms: u64,
    pub since_last_ping_ms: Option<u64>,
    pub stale: bool,
}
