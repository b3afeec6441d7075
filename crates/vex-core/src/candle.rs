//! Candle (OHLCV bar) type.
//!
//! Bars arrive from two places with the same row layout
//! `[ts, open, high, low, close, volume, ...]`: the historical candle
//! endpoint and the streaming candle channel. Exchanges send every
//! field as a string; numeric JSON values are accepted as well.

use crate::error::{CoreError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Maximum number of bars retained per asset.
pub const CANDLE_CAPACITY: usize = 30;

/// Immutable OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleBar {
    /// Bar open time (epoch milliseconds). Unique key within one asset's series.
    pub ts: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl CandleBar {
    /// Create a new bar.
    pub fn new(
        ts: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            ts,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// High minus low.
    #[inline]
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    /// Parse one exchange row. Fields beyond volume are ignored.
    pub fn from_row(row: &[Value]) -> Result<Self> {
        if row.len() < 6 {
            return Err(CoreError::MalformedRow(format!(
                "expected at least 6 fields, got {}",
                row.len()
            )));
        }

        Ok(Self {
            ts: timestamp_field(&row[0])?,
            open: decimal_field(&row[1], "open")?,
            high: decimal_field(&row[2], "high")?,
            low: decimal_field(&row[3], "low")?,
            close: decimal_field(&row[4], "close")?,
            volume: decimal_field(&row[5], "volume")?,
        })
    }

    /// Parse a list of rows, skipping malformed ones.
    ///
    /// Returns the parsed bars (input order preserved) and the number of
    /// rows that were skipped.
    pub fn parse_rows(rows: &[Vec<Value>]) -> (Vec<Self>, usize) {
        let mut bars = Vec::with_capacity(rows.len());
        let mut skipped = 0;
        for row in rows {
            match Self::from_row(row) {
                Ok(bar) => bars.push(bar),
                Err(_) => skipped += 1,
            }
        }
        (bars, skipped)
    }
}

fn timestamp_field(value: &Value) -> Result<i64> {
    match value {
        Value::String(s) => s.parse::<i64>().map_err(|_| CoreError::InvalidNumber {
            field: "ts",
            value: s.clone(),
        }),
        Value::Number(n) => n.as_i64().ok_or_else(|| CoreError::InvalidNumber {
            field: "ts",
            value: n.to_string(),
        }),
        other => Err(CoreError::InvalidNumber {
            field: "ts",
            value: other.to_string(),
        }),
    }
}

fn decimal_field(value: &Value, field: &'static str) -> Result<Decimal> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(CoreError::InvalidNumber {
                field,
                value: other.to_string(),
            })
        }
    };

    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|_| CoreError::InvalidNumber { field, value: raw })
}
