//! WebSocket connection manager.
//!
//! Owns at most one live session. Each connect attempt is tagged with a
//! [`SessionId`]; open/close/watchdog callbacks are applied only while
//! their session is current (see [`crate::session`]). Reconnects use a
//! fixed delay and are retried forever until the application disconnects
//! or shuts down.

use crate::error::{WsError, WsResult};
use crate::heartbeat::Watchdog;
use crate::message::{DataFrame, InboundFrame, SubscriptionOp, WsRequest, PING};
use crate::session::{CloseDecision, ConnectionState, SessionId, SessionLifecycle};
use crate::subscription::SubscriptionRegistry;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vex_core::AssetSymbol;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const OUTBOUND_BUFFER: usize = 256;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Candle channel name, e.g. "candle1H".
    pub channel: String,
    /// Ping interval. The watchdog fires after 1.5x this without a frame.
    pub heartbeat_interval_ms: u64,
    /// Fixed delay before a reconnect attempt.
    pub reconnect_delay_ms: u64,
    pub subscribe_batch: usize,
    pub unsubscribe_batch: usize,
    /// Pause between subscribe batches.
    pub batch_pace_ms: u64,
    /// Extra handshake header sent on every connect.
    pub extra_header: Option<(String, String)>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "wss://ws.okx.com:8443/ws/v5/business".to_string(),
            channel: "candle1H".to_string(),
            heartbeat_interval_ms: 20_000,
            reconnect_delay_ms: 5_000,
            subscribe_batch: 40,
            unsubscribe_batch: 50,
            batch_pace_ms: 50,
            extra_header: None,
        }
    }
}

impl ConnectionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn batch_pace(&self) -> Duration {
        Duration::from_millis(self.batch_pace_ms)
    }
}

/// Receiver for candle-channel data frames.
///
/// Invoked on the session's read task; implementations must return
/// quickly and must not block on I/O.
pub trait FrameHandler: Send + Sync + 'static {
    fn on_frame(&self, frame: DataFrame);
}

struct ActiveSession {
    id: SessionId,
    cancel: CancellationToken,
    outbound: mpsc::Sender<String>,
}

struct Slot {
    lifecycle: SessionLifecycle,
    active: Option<ActiveSession>,
}

struct Inner {
    config: ConnectionConfig,
    /// Serializes connect, disconnect and session callbacks.
    slot: Mutex<Slot>,
    state_tx: watch::Sender<ConnectionState>,
    registry: SubscriptionRegistry,
    handler: Arc<dyn FrameHandler>,
    shutdown_token: CancellationToken,
}

/// Streaming connection manager. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create a new connection manager. Nothing connects until [`connect`](Self::connect).
    pub fn new(config: ConnectionConfig, handler: Arc<dyn FrameHandler>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                slot: Mutex::new(Slot {
                    lifecycle: SessionLifecycle::new(),
                    active: None,
                }),
                state_tx,
                registry: SubscriptionRegistry::new(),
                handler,
                shutdown_token: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.slot.lock().lifecycle.state()
    }

    /// Receiver that observes every state transition.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.inner.slot.lock().lifecycle.current()
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    /// Open a new session, superseding any existing one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut slot = self.inner.slot.lock();
        self.inner.connect_locked(&mut slot);
    }

    /// Close the current session without scheduling a reconnect.
    /// The subscription registry is kept for the next `connect`.
    pub fn disconnect(&self) {
        let mut slot = self.inner.slot.lock();
        let previous = slot.lifecycle.terminate();
        if let Some(active) = slot.active.take() {
            active.cancel.cancel();
        }
        self.inner.publish(&slot);
        info!(session = ?previous, "WS disconnected by user");
    }

    /// Stop all sessions and pending reconnects permanently.
    pub fn shutdown(&self) {
        info!("ConnectionManager shutdown requested");
        self.inner.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown_token.is_cancelled()
    }

    /// Track symbols and, if connected, subscribe the new ones.
    ///
    /// Returns the number of newly tracked symbols.
    pub async fn subscribe(&self, symbols: &[AssetSymbol]) -> usize {
        let added = self.inner.registry.track(symbols);
        if added.is_empty() {
            return 0;
        }

        match self.inner.live_outbound() {
            Some(outbound) => {
                info!(count = added.len(), "WS: subscribing to new channels");
                self.inner
                    .send_requests(SubscriptionOp::Subscribe, &added, &outbound)
                    .await;
            }
            None => {
                debug!(
                    count = added.len(),
                    "Not connected, subscriptions queued for next session"
                );
            }
        }
        added.len()
    }

    /// Stop tracking symbols and, if connected, unsubscribe them.
    ///
    /// Returns the number of symbols that were tracked.
    pub async fn unsubscribe(&self, symbols: &[AssetSymbol]) -> usize {
        let removed = self.inner.registry.untrack(symbols);
        if removed.is_empty() {
            return 0;
        }

        if let Some(outbound) = self.inner.live_outbound() {
            info!(count = removed.len(), "WS: unsubscribing channels");
            self.inner
                .send_requests(SubscriptionOp::Unsubscribe, &removed, &outbound)
                .await;
        }
        removed.len()
    }
}

impl Inner {
    fn publish(&self, slot: &Slot) {
        let state = slot.lifecycle.state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    fn live_outbound(&self) -> Option<mpsc::Sender<String>> {
        let slot = self.slot.lock();
        if !slot.lifecycle.state().is_connected() {
            return None;
        }
        slot.active.as_ref().map(|a| a.outbound.clone())
    }

    fn connect_locked(self: &Arc<Self>, slot: &mut Slot) {
        if self.shutdown_token.is_cancelled() {
            warn!("Connect requested after shutdown, ignoring");
            return;
        }

        if let Some(old) = slot.active.take() {
            debug!(session = %old.id, "Superseding session");
            old.cancel.cancel();
        }

        let (id, _) = slot.lifecycle.begin();
        let cancel = self.shutdown_token.child_token();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        slot.active = Some(ActiveSession {
            id,
            cancel: cancel.clone(),
            outbound: outbound_tx,
        });
        self.publish(slot);

        info!(session = %id, url = %self.config.url, "Connecting to WebSocket");
        tokio::spawn(Arc::clone(self).run_session(id, cancel, outbound_rx));
    }

    async fn run_session(
        self: Arc<Self>,
        id: SessionId,
        cancel: CancellationToken,
        mut outbound_rx: mpsc::Receiver<String>,
    ) {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.on_closed(id, "cancelled before open");
                return;
            }
            result = self.open_stream() => result,
        };

        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                warn!(session = %id, error = %e, "WS connect failed");
                self.on_closed(id, &e.to_string());
                return;
            }
        };

        let (mut write, mut read) = stream.split();
        let watchdog = Arc::new(Watchdog::new(self.config.heartbeat_interval()));

        if !self.on_open(id, &watchdog) {
            let _ = write.send(Message::Close(None)).await;
            return;
        }

        let reason = match self
            .pump(&cancel, &watchdog, &mut write, &mut read, &mut outbound_rx)
            .await
        {
            Ok(()) => "cancelled".to_string(),
            Err(e) => {
                warn!(session = %id, error = %e, "WS session ended");
                e.to_string()
            }
        };
        self.on_closed(id, &reason);
    }

    async fn open_stream(&self) -> WsResult<WsStream> {
        let mut request = self.config.url.as_str().into_client_request()?;
        if let Some((name, value)) = &self.config.extra_header {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| WsError::InvalidHeader(e.to_string()))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| WsError::InvalidHeader(e.to_string()))?;
            request.headers_mut().insert(name, value);
        }

        let (stream, _response) = tokio::time::timeout(
            CONNECT_TIMEOUT,
            connect_async_tls_with_config(request, None, true, None),
        )
        .await
        .map_err(|_| {
            WsError::ConnectionFailed(format!(
                "handshake timed out after {}s",
                CONNECT_TIMEOUT.as_secs()
            ))
        })??;
        Ok(stream)
    }

    /// Read/write loop. Returns `Ok(())` only when the session was cancelled.
    async fn pump(
        &self,
        cancel: &CancellationToken,
        watchdog: &Watchdog,
        write: &mut SplitSink<WsStream, Message>,
        read: &mut SplitStream<WsStream>,
        outbound_rx: &mut mpsc::Receiver<String>,
    ) -> WsResult<()> {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(?e, "Failed to send Close frame");
                    }
                    return Ok(());
                }

                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        watchdog.record_frame();
                        self.handle_text(&text);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        watchdog.record_frame();
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.to_string()))
                            .unwrap_or((1005, String::new()));
                        return Err(WsError::ConnectionClosed { code, reason });
                    }
                    Some(Ok(_)) => watchdog.record_frame(),
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        return Err(WsError::ConnectionClosed {
                            code: 1006,
                            reason: "stream ended".to_string(),
                        });
                    }
                },

                Some(text) = outbound_rx.recv() => {
                    write.send(Message::Text(text)).await?;
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match InboundFrame::parse(text) {
            Some(InboundFrame::Data(frame)) => {
                if frame.arg.channel == self.config.channel {
                    self.handler.on_frame(frame);
                } else {
                    debug!(channel = %frame.arg.channel, "Ignoring frame for foreign channel");
                }
            }
            Some(InboundFrame::Pong) => debug!("Heartbeat: pong received"),
            Some(InboundFrame::Event(ev)) if ev.is_error() => {
                warn!(code = ?ev.code, msg = ?ev.msg, "WS event error");
            }
            Some(InboundFrame::Event(ev)) => debug!(event = %ev.event, "WS event"),
            None => debug!(len = text.len(), "Discarding unrecognised frame"),
        }
    }

    fn on_open(self: &Arc<Self>, id: SessionId, watchdog: &Arc<Watchdog>) -> bool {
        let mut slot = self.slot.lock();
        if !slot.lifecycle.opened(id) {
            debug!(session = %id, "Ignoring open from superseded session");
            return false;
        }
        let Some((cancel, outbound)) = slot
            .active
            .as_ref()
            .filter(|a| a.id == id)
            .map(|a| (a.cancel.clone(), a.outbound.clone()))
        else {
            return false;
        };

        watchdog.reset();
        self.publish(&slot);
        info!(session = %id, "WS connected");

        tokio::spawn(Arc::clone(self).heartbeat_loop(
            id,
            cancel,
            outbound.clone(),
            Arc::clone(watchdog),
        ));

        let replay = self.registry.snapshot();
        if !replay.is_empty() {
            info!(session = %id, count = replay.len(), "Replaying subscriptions");
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                inner
                    .send_requests(SubscriptionOp::Subscribe, &replay, &outbound)
                    .await;
            });
        }
        true
    }

    fn on_closed(self: &Arc<Self>, id: SessionId, reason: &str) {
        let mut slot = self.slot.lock();
        match slot.lifecycle.closed(id) {
            CloseDecision::Stale => {
                debug!(session = %id, reason, "Ignoring close from superseded session");
            }
            CloseDecision::Reconnect => {
                if let Some(active) = slot.active.take() {
                    active.cancel.cancel();
                }
                self.publish(&slot);
                warn!(session = %id, reason, "WS closed");
                self.schedule_reconnect_locked(&mut slot);
            }
        }
    }

    fn on_watchdog_expired(self: &Arc<Self>, id: SessionId) {
        let mut slot = self.slot.lock();
        if !slot.lifecycle.watchdog_expired(id) {
            return;
        }
        if let Some(active) = slot.active.take() {
            active.cancel.cancel();
        }
        self.publish(&slot);
        self.schedule_reconnect_locked(&mut slot);
    }

    fn schedule_reconnect_locked(self: &Arc<Self>, slot: &mut Slot) {
        if self.shutdown_token.is_cancelled() {
            debug!("Shutdown in progress, not reconnecting");
            return;
        }
        if !slot.lifecycle.await_reconnect() {
            return;
        }
        self.publish(slot);

        let delay = self.config.reconnect_delay();
        info!(delay_ms = delay.as_millis() as u64, "Waiting to reconnect");

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = inner.shutdown_token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let mut slot = inner.slot.lock();
            if slot.lifecycle.should_reconnect() {
                info!("Reconnecting now");
                inner.connect_locked(&mut slot);
            } else {
                debug!(state = %slot.lifecycle.state(), "Pending reconnect superseded");
            }
        });
    }

    async fn heartbeat_loop(
        self: Arc<Self>,
        id: SessionId,
        cancel: CancellationToken,
        outbound: mpsc::Sender<String>,
        watchdog: Arc<Watchdog>,
    ) {
        let interval = watchdog.interval();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            if watchdog.is_stale() {
                let reason = WsError::WatchdogExpired(watchdog.stats().since_last_frame_ms);
                error!(session = %id, %reason, "WS watchdog triggered, forcing reconnect");
                self.on_watchdog_expired(id);
                break;
            }

            if outbound.send(PING.to_string()).await.is_err() {
                break;
            }
            watchdog.record_ping();
        }
    }

    /// Encode and queue requests in batches. Subscribe batches are paced.
    /// Returns the number of frames queued.
    async fn send_requests(
        &self,
        op: SubscriptionOp,
        symbols: &[AssetSymbol],
        outbound: &mpsc::Sender<String>,
    ) -> usize {
        let batch = match op {
            SubscriptionOp::Subscribe => self.config.subscribe_batch,
            SubscriptionOp::Unsubscribe => self.config.unsubscribe_batch,
        };
        let requests = WsRequest::batched(op, &self.config.channel, symbols, batch);
        let total = requests.len();
        let mut sent = 0;

        for (i, request) in requests.iter().enumerate() {
            let text = match serde_json::to_string(request) {
                Ok(text) => text,
                Err(e) => {
                    error!(?e, %op, "Failed to encode request");
                    continue;
                }
            };
            if outbound.send(text).await.is_err() {
                warn!(%op, sent, total, "Session closed while sending requests");
                break;
            }
            sent += 1;
            if op == SubscriptionOp::Subscribe && i + 1 < total {
                tokio::time::sleep(self.config.batch_pace()).await;
            }
        }
        sent
    }
}
