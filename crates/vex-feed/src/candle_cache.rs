//! Bounded per-asset candle cache.
//!
//! Each admitted asset owns a newest-first series of at most
//! [`CANDLE_CAPACITY`] bars with unique timestamps. The series sits behind
//! its own lock so stream merges and backfill merges for one asset are
//! serialized while different assets proceed independently.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;
use vex_core::{AssetSymbol, CandleBar, CANDLE_CAPACITY};

type Series = Arc<Mutex<VecDeque<CandleBar>>>;

/// How a streamed bar landed in the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMerge {
    /// Series was empty.
    First,
    /// Same timestamp as the head; head replaced (bar still forming).
    ReplacedHead,
    /// Newer than the head; became the new head.
    Prepended,
    /// Older than the head; placed at its sorted position. Prepending it
    /// would break the strictly descending timestamp order.
    Late,
}

/// Concurrent candle store keyed by asset.
pub struct CandleCache {
    series: DashMap<AssetSymbol, Series>,
    capacity: usize,
}

impl Default for CandleCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CandleCache {
    pub fn new() -> Self {
        Self::with_capacity(CANDLE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            series: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register an empty series. Returns false if the asset was already present.
    pub fn admit(&self, symbol: &AssetSymbol) -> bool {
        let mut created = false;
        self.series.entry(symbol.clone()).or_insert_with(|| {
            created = true;
            Arc::new(Mutex::new(VecDeque::with_capacity(self.capacity)))
        });
        created
    }

    /// Drop the series. Returns false if the asset was not present.
    ///
    /// Waits out any merge already holding the series lock, so once this
    /// returns no `merge_stream` inspection for the asset is still running.
    pub fn evict(&self, symbol: &str) -> bool {
        match self.series.remove(symbol) {
            Some((_, series)) => {
                drop(series.lock());
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.series.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Bars currently held for `symbol`.
    pub fn bar_count(&self, symbol: &str) -> Option<usize> {
        self.get(symbol).map(|s| s.lock().len())
    }

    /// Consistent newest-first copy of the series.
    pub fn snapshot(&self, symbol: &str) -> Option<Vec<CandleBar>> {
        self.get(symbol).map(|s| s.lock().iter().copied().collect())
    }

    /// Merge historical bars.
    ///
    /// Bars whose timestamp is already present are ignored, so a bar the
    /// stream delivered first is never overwritten by an older copy.
    /// Returns the resulting length, or `None` if the asset is not admitted.
    pub fn merge_backfill(&self, symbol: &str, bars: &[CandleBar]) -> Option<usize> {
        let series = self.get(symbol)?;
        let mut guard = series.lock();
        if !self.is_current(symbol, &series) {
            return None;
        }
        merge_bulk(&mut guard, bars, self.capacity);
        Some(guard.len())
    }

    /// Merge one streamed bar, then run `inspect` on the updated series
    /// while the lock is still held.
    ///
    /// Returns `None` (and does nothing) if the asset is not admitted.
    pub fn merge_stream<R>(
        &self,
        symbol: &str,
        bar: CandleBar,
        inspect: impl FnOnce(StreamMerge, &[CandleBar]) -> R,
    ) -> Option<R> {
        let Some(series) = self.get(symbol) else {
            debug!(symbol, "Dropping bar for asset outside the pool");
            return None;
        };
        let mut guard = series.lock();
        if !self.is_current(symbol, &series) {
            debug!(symbol, "Dropping bar for asset evicted mid-merge");
            return None;
        }
        let merge = merge_one(&mut guard, bar, self.capacity);
        Some(inspect(merge, guard.make_contiguous()))
    }

    fn get(&self, symbol: &str) -> Option<Series> {
        self.series.get(symbol).map(|entry| Arc::clone(entry.value()))
    }

    /// `series` is still the one registered for `symbol`. Checked with the
    /// series lock held.
    fn is_current(&self, symbol: &str, series: &Series) -> bool {
        self.series
            .get(symbol)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), series))
    }
}

fn merge_bulk(series: &mut VecDeque<CandleBar>, bars: &[CandleBar], capacity: usize) {
    let mut seen: HashSet<i64> = series.iter().map(|b| b.ts).collect();
    let mut combined: Vec<CandleBar> = series.drain(..).collect();
    for bar in bars {
        if seen.insert(bar.ts) {
            combined.push(*bar);
        }
    }
    // Stable, so input already newest-first keeps its order.
    combined.sort_by(|a, b| b.ts.cmp(&a.ts));
    combined.truncate(capacity);
    series.extend(combined);
}

fn merge_one(series: &mut VecDeque<CandleBar>, bar: CandleBar, capacity: usize) -> StreamMerge {
    let outcome = match series.front().map(|head| head.ts) {
        None => {
            series.push_front(bar);
            StreamMerge::First
        }
        Some(head_ts) if head_ts == bar.ts => {
            series[0] = bar;
            StreamMerge::ReplacedHead
        }
        Some(head_ts) if bar.ts > head_ts => {
            series.push_front(bar);
            StreamMerge::Prepended
        }
        Some(_) => {
            match series.iter().position(|b| b.ts <= bar.ts) {
                Some(i) if series[i].ts == bar.ts => series[i] = bar,
                Some(i) => series.insert(i, bar),
                None => series.push_back(bar),
            }
            StreamMerge::Late
        }
    };
    series.truncate(capacity);
    outcome
}
