//! WebSocket message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use vex_core::AssetSymbol;

/// Application-level heartbeat frames (plain text, not JSON).
pub const PING: &str = "ping";
pub const PONG: &str = "pong";

// ============================================================================
// Outgoing
// ============================================================================

/// Subscription operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionOp {
    Subscribe,
    Unsubscribe,
}

impl SubscriptionOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

impl fmt::Display for SubscriptionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (channel, instrument) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelArg {
    pub channel: String,
    #[serde(rename = "instId")]
    pub inst_id: String,
}

/// Subscribe/unsubscribe request.
///
/// `{"op":"subscribe","args":[{"channel":"candle1H","instId":"BTC-USDT-SWAP"}]}`
#[derive(Debug, Clone, Serialize)]
pub struct WsRequest {
    pub op: &'static str,
    pub args: Vec<ChannelArg>,
}

impl WsRequest {
    pub fn new(op: SubscriptionOp, channel: &str, symbols: &[AssetSymbol]) -> Self {
        Self {
            op: op.as_str(),
            args: symbols
                .iter()
                .map(|s| ChannelArg {
                    channel: channel.to_string(),
                    inst_id: s.as_str().to_string(),
                })
                .collect(),
        }
    }

    /// Split `symbols` into requests of at most `batch` args each.
    pub fn batched(
        op: SubscriptionOp,
        channel: &str,
        symbols: &[AssetSymbol],
        batch: usize,
    ) -> Vec<Self> {
        symbols
            .chunks(batch.max(1))
            .map(|chunk| Self::new(op, channel, chunk))
            .collect()
    }
}

// ============================================================================
// Incoming
// ============================================================================

/// Control/event frame: `{"event":"subscribe",...}` or `{"event":"error",...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub arg: Option<ChannelArg>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
}

impl EventFrame {
    pub fn is_error(&self) -> bool {
        self.event == "error"
    }
}

/// Channel data frame: `{"arg":{"channel":..,"instId":..},"data":[[..],..]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DataFrame {
    pub arg: ChannelArg,
    pub data: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFrame {
    Event(EventFrame),
    Data(DataFrame),
}

/// Classified inbound text frame.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    Pong,
    Event(EventFrame),
    Data(DataFrame),
}

impl InboundFrame {
    /// Classify a text frame. Returns `None` for anything unrecognised.
    pub fn parse(text: &str) -> Option<Self> {
        if text == PONG {
            return Some(Self::Pong);
        }
        match serde_json::from_str::<RawFrame>(text).ok()? {
            RawFrame::Event(ev) => Some(Self::Event(ev)),
            RawFrame::Data(data) => Some(Self::Data(data)),
        }
    }
}
