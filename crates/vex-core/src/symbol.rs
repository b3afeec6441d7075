//! Asset symbol identifier.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Instrument identifier as the exchange spells it (e.g., "BTC-USDT-SWAP").
///
/// Opaque: no part of the system interprets it beyond prefix matching
/// during universe filtering. Hashes identically to the inner `str`, so
/// keyed collections can be queried with `&str`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetSymbol(String);

impl AssetSymbol {
    #[inline]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base currency, i.e. the segment before the first `-`.
    pub fn base(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for AssetSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetSymbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AssetSymbol {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for AssetSymbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for AssetSymbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
