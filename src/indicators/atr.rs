// =============================================================================
// Average True Range (ATR) — Wilder's Smoothing Method
// =============================================================================
//
//   TR    = max(H - L, |H - prevClose|, |L - prevClose|)
//   ATR_0 = SMA of first `period` TR values
//   ATR_t = (ATR_{t-1} * (period - 1) + TR_t) / period
//
// Minimum lookback: `period + 1` candles.
// =============================================================================

use crate::market_data::Candle;

/// True range of `cur` against the previous close.
///
/// `None` if any input is non-finite: `f64::max` would silently drop a NaN.
pub fn true_range(prev: &Candle, cur: &Candle) -> Option<f64> {
    if ![cur.high, cur.low, prev.close].iter().all(|v| v.is_finite()) {
        return None;
    }
    let tr = (cur.high - cur.low)
        .max((cur.high - prev.close).abs())
        .max((cur.low - prev.close).abs());
    tr.is_finite().then_some(tr)
}

/// Compute the most recent ATR value.
///
/// # Arguments
/// * `candles` - OHLC bars, oldest first
/// * `period` - Wilder smoothing period
///
/// # Returns
/// `None` when `period` is zero, there are fewer than `period + 1` candles,
/// or any input or intermediate value is non-finite.
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    // --- Step 1: true range per transition ---
    let tr_values: Vec<f64> = candles
        .windows(2)
        .map(|w| true_range(&w[0], &w[1]))
        .collect::<Option<_>>()?;

    // --- Step 2: seed with the SMA, then Wilder-smooth ---

    let period_f = period as f64;
    let mut atr = tr_values[..period].iter().sum::<f64>() / period_f;
    if !atr.is_finite() {
        return None;
    }

    for &tr in &tr_values[period..] {
        atr = (atr * (period_f - 1.0) + tr) / period_f;
        if !atr.is_finite() {
            return None;
        }
    }

    Some(atr)
}

/// ATR as a percentage of the last close, for comparing across price scales.
pub fn calculate_atr_pct(candles: &[Candle], period: usize) -> Option<f64> {
    let atr = calculate_atr(candles, period)?;
    let last_close = candles.last()?.close;
    if last_close == 0.0 {
        return None;
    }
    Some(atr / last_close * 100.0)
}
