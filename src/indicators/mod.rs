// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator functions over an ascending candle series.
// They work on sequence position only: calendar gaps between candles are
// irrelevant. Every function has a documented minimum lookback and returns an
// empty series or `None` below it rather than a misleading number.
//
// Series outputs are tail-aligned: the last element always corresponds to the
// last input candle.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod mfi;
pub mod obv;
pub mod rsi;

/// Change of a series over the last `bars` steps (`last - series[len-1-bars]`).
///
/// Returns `None` when the series is shorter than `bars + 1`.
pub fn change_over(series: &[f64], bars: usize) -> Option<f64> {
    let n = series.len();
    if n < bars + 1 {
        return None;
    }
    let delta = series[n - 1] - series[n - 1 - bars];
    delta.is_finite().then_some(delta)
}

/// Fraction of `window` values that are strictly below `value`, in [0, 1].
/// Values within a relative 1e-9 of `value` count as equal, so rounding noise
/// between windows summed in different orders does not move the rank.
///
/// Returns `None` for an empty window.
pub fn percentile_rank(window: &[f64], value: f64) -> Option<f64> {
    if window.is_empty() {
        return None;
    }
    let floor = value - value.abs() * 1e-9;
    let below = window.iter().filter(|&&v| v < floor).count();
    Some(below as f64 / window.len() as f64)
}
