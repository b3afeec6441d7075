//! Streaming connection manager for vexwatch.
//!
//! Provides a resilient candle-channel session with:
//! - Session-identity tagging so a superseded session's late callbacks are ignored
//! - Fixed-backoff reconnection with no attempt limit
//! - Heartbeat ping loop with a frame watchdog (1.5x the ping interval)
//! - A subscription registry that survives reconnects and is replayed on open
//! - Batched, paced subscribe/unsubscribe frames

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod session;
pub mod subscription;

pub use connection::{ConnectionConfig, ConnectionManager, FrameHandler};
pub use error::{WsError, WsResult};
pub use heartbeat::{Watchdog, WatchdogStats};
pub use message::{ChannelArg, DataFrame, EventFrame, InboundFrame, SubscriptionOp, WsRequest};
pub use session::{CloseDecision, ConnectionState, SessionId, SessionLifecycle};
pub use subscription::SubscriptionRegistry;

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
