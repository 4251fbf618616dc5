// =============================================================================
// Regime Classifier
// =============================================================================
//
// Labels price behaviour from two inputs: ADX (trend strength) and where the
// current Bollinger Band Width sits within its trailing distribution.
//
// Decision table (first match wins):
//
//   1. TREND      — ADX >= trend_adx AND width percentile >= split
//   2. RANGE      — ADX <= range_adx AND width percentile <= split
//   3. TRANSITION — everything else
//
// The classifier is a pure function; nothing is cached between symbols.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::ScoringConfig;
use crate::indicators::bollinger::{calculate_bollinger_series, BollingerResult};
use crate::indicators::percentile_rank;
use crate::types::Regime;

// =============================================================================
// Types
// =============================================================================

/// Thresholds for the decision table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeThresholds {
    pub trend_adx: f64,
    pub range_adx: f64,
    pub width_percentile_split: f64,
}

impl From<&ScoringConfig> for RegimeThresholds {
    fn from(cfg: &ScoringConfig) -> Self {
        Self {
            trend_adx: cfg.trend_adx,
            range_adx: cfg.range_adx,
            width_percentile_split: cfg.width_percentile_split,
        }
    }
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self::from(&ScoringConfig::default())
    }
}

/// Band-width context for the last candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandWidthProfile {
    /// Latest Bollinger Band Width (% of middle band).
    pub width: f64,
    /// Fraction of the trailing window strictly below `width`, in [0, 1].
    pub percentile: f64,
    /// Relative width change over the acceleration window; > 0 is expansion.
    pub expansion: f64,
}

/// Relative width growth below this is treated as flat.
const EXPANSION_EPSILON: f64 = 1e-6;

impl BandWidthProfile {
    pub fn is_expanding(&self) -> bool {
        self.expansion > EXPANSION_EPSILON
    }
}

/// Bands plus width profile computed once per symbol.
#[derive(Debug, Clone)]
pub struct BandContext {
    pub last: BollingerResult,
    pub profile: BandWidthProfile,
}

/// Compute the band context for `closes`.
///
/// `window` caps the trailing widths used for the percentile; `accel_bars`
/// is the look-back for the expansion delta. Returns `None` below the
/// Bollinger minimum lookback.
pub fn band_context(
    closes: &[f64],
    period: usize,
    mult: f64,
    window: usize,
    accel_bars: usize,
) -> Option<BandContext> {
    let series = calculate_bollinger_series(closes, period, mult);
    let last = *series.last()?;

    let widths: Vec<f64> = series.iter().map(|b| b.width).collect();
    let start = widths.len().saturating_sub(window.max(1));
    let percentile = percentile_rank(&widths[start..], last.width)?;

    let expansion = match widths.len().checked_sub(accel_bars + 1) {
        Some(i) if widths[i] > 0.0 => (last.width - widths[i]) / widths[i],
        _ => 0.0,
    };

    Some(BandContext {
        last,
        profile: BandWidthProfile {
            width: last.width,
            percentile,
            expansion: if expansion.is_finite() { expansion } else { 0.0 },
        },
    })
}

// =============================================================================
// Classification logic
// =============================================================================

/// Determine the regime from ADX and the band-width percentile.
pub fn classify(adx: f64, width_percentile: f64, t: &RegimeThresholds) -> Regime {
    if adx >= t.trend_adx && width_percentile >= t.width_percentile_split {
        return Regime::Trend;
    }
    if adx <= t.range_adx && width_percentile <= t.width_percentile_split {
        return Regime::Range;
    }

    trace!(
        adx = format!("{:.2}", adx),
        width_percentile = format!("{:.2}", width_percentile),
        "regime: no rule matched, transition"
    );
    Regime::Transition
}
