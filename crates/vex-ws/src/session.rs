//! Session lifecycle.
//!
//! Every connection attempt gets a fresh [`SessionId`]. Callbacks from
//! the socket carry the id of the session that produced them and are
//! acted on only while that id is current, so a superseded session can
//! never flip state or schedule a reconnect.
//!
//! This type is plain data; the connection manager holds it behind one
//! lock so connect, disconnect and callback handling are serialized.

use std::fmt;

/// Identity of one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the reconnect delay.
    ReconnectPending,
    /// Closed by the application; no automatic reconnect.
    UserTerminated,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ReconnectPending => "reconnect_pending",
            Self::UserTerminated => "user_terminated",
        };
        f.write_str(s)
    }
}

/// Outcome of a close/failure callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    /// The callback came from a session that is no longer current.
    Stale,
    /// The current session ended; the caller should schedule a reconnect.
    Reconnect,
}

/// State machine for session identity and reconnect gating.
#[derive(Debug)]
pub struct SessionLifecycle {
    state: ConnectionState,
    current: Option<SessionId>,
    next_id: u64,
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            current: None,
            next_id: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn current(&self) -> Option<SessionId> {
        self.current
    }

    pub fn is_current(&self, id: SessionId) -> bool {
        self.current == Some(id)
    }

    /// Start a new session. Returns the new id and the superseded one, if any.
    pub fn begin(&mut self) -> (SessionId, Option<SessionId>) {
        self.next_id += 1;
        let id = SessionId(self.next_id);
        let superseded = self.current.replace(id);
        self.state = ConnectionState::Connecting;
        (id, superseded)
    }

    /// Session handshake completed. Returns false if `id` is stale.
    pub fn opened(&mut self, id: SessionId) -> bool {
        if !self.is_current(id) {
            return false;
        }
        self.state = ConnectionState::Connected;
        true
    }

    /// Session closed or failed.
    pub fn closed(&mut self, id: SessionId) -> CloseDecision {
        if !self.is_current(id) {
            return CloseDecision::Stale;
        }
        self.current = None;
        self.state = ConnectionState::Disconnected;
        CloseDecision::Reconnect
    }

    /// Watchdog fired for `id`. Returns true if the session was torn down.
    pub fn watchdog_expired(&mut self, id: SessionId) -> bool {
        if !self.is_current(id) || self.state != ConnectionState::Connected {
            return false;
        }
        self.current = None;
        self.state = ConnectionState::Disconnected;
        true
    }

    /// Application-requested close. Returns the session that was current.
    pub fn terminate(&mut self) -> Option<SessionId> {
        self.state = ConnectionState::UserTerminated;
        self.current.take()
    }

    /// Enter the reconnect wait. Only valid from `Disconnected`, so at most
    /// one reconnect is ever pending.
    pub fn await_reconnect(&mut self) -> bool {
        if self.state != ConnectionState::Disconnected {
            return false;
        }
        self.state = ConnectionState::ReconnectPending;
        true
    }

    /// Checked after the reconnect delay: a manual connect or disconnect in
    /// the meantime cancels the pending attempt.
    pub fn should_reconnect(&self) -> bool {
        self.state == ConnectionState::ReconnectPending
    }
}
