//! Phase detector.
//!
//! Pure scoring of a newest-first bar series. Always returns the full
//! diagnostic tuple so callers can log sub-threshold readings.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use vex_core::CandleBar;

/// Bars in the noise baseline (bars 1..=24).
pub const BASELINE_BARS: usize = 24;

/// Current bar plus the baseline. Shorter series never trigger: a new
/// listing's baseline is too thin to be meaningful.
pub const MIN_BARS: usize = BASELINE_BARS + 1;

/// Detector output.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PhaseReading {
    pub triggered: bool,
    /// IC / NB. Zero when NB is zero or history is short.
    pub ver: f64,
    /// Close of the current bar.
    pub price: Decimal,
    /// Instantaneous change: current bar high - low.
    pub ic: Decimal,
    /// Noise baseline: mean high - low of the baseline bars.
    pub nb: Decimal,
    /// Timestamp of the current bar.
    pub bar_ts: i64,
}

/// Score `bars` (newest first) against `threshold`.
pub fn analyze(bars: &[CandleBar], threshold: f64) -> PhaseReading {
    if bars.len() < MIN_BARS {
        return PhaseReading::default();
    }

    let current = &bars[0];
    let ic = current.range();
    let nb = bars[1..=BASELINE_BARS]
        .iter()
        .map(CandleBar::range)
        .sum::<Decimal>()
        / Decimal::from(BASELINE_BARS as u64);

    let Some(ratio) = ic.checked_div(nb) else {
        // NB == 0 (or overflow): report the inputs, skip the division
        return PhaseReading {
            ic,
            nb,
            bar_ts: current.ts,
            ..Default::default()
        };
    };

    let ver = ratio.to_f64().unwrap_or(0.0);
    PhaseReading {
        triggered: ver >= threshold,
        ver,
        price: current.close,
        ic,
        nb,
        bar_ts: current.ts,
    }
}
