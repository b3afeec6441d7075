//! Subscription registry.
//!
//! The set of symbols the application wants streamed. It is the source
//! of truth across reconnects: every new session replays the full set.

use dashmap::DashSet;
use vex_core::AssetSymbol;

/// Desired-subscription set.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    desired: DashSet<AssetSymbol>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add symbols. Returns only those that were not already tracked,
    /// in input order.
    pub fn track(&self, symbols: &[AssetSymbol]) -> Vec<AssetSymbol> {
        symbols
            .iter()
            .filter(|s| self.desired.insert((*s).clone()))
            .cloned()
            .collect()
    }

    /// Remove symbols. Returns those that were actually tracked.
    pub fn untrack(&self, symbols: &[AssetSymbol]) -> Vec<AssetSymbol> {
        symbols
            .iter()
            .filter(|s| self.desired.remove(s.as_str()).is_some())
            .cloned()
            .collect()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.desired.contains(symbol)
    }

    pub fn len(&self) -> usize {
        self.desired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.desired.is_empty()
    }

    /// Sorted copy of the tracked set.
    pub fn snapshot(&self) -> Vec<AssetSymbol> {
        let mut all: Vec<_> = self.desired.iter().map(|s| s.key().clone()).collect();
        all.sort();
        all
    }
}
