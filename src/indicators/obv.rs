// =============================================================================
// On-Balance Volume (OBV)
// =============================================================================
//
// Running total of volume signed by the direction of the close:
//   close > prev  => OBV += volume
//   close < prev  => OBV -= volume
//   otherwise     => unchanged
//
// The series starts at 0 on the first candle. Minimum lookback: 2 candles.
// =============================================================================

use crate::market_data::Candle;

/// Full OBV series, one value per candle starting at 0.
///
/// Empty below 2 candles or if the running total turns non-finite.
pub fn calculate_obv(candles: &[Candle]) -> Vec<f64> {
    if candles.len() < 2 {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(candles.len());
    let mut obv = 0.0_f64;
    out.push(obv);

    for pair in candles.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        // A NaN close compares neither up nor down.
        if !cur.close.is_finite() || !prev.close.is_finite() {
            return Vec::new();
        }
        if cur.close > prev.close {
            obv += cur.volume;
        } else if cur.close < prev.close {
            obv -= cur.volume;
        }
        if !obv.is_finite() {
            return Vec::new();
        }
        out.push(obv);
    }

    out
}

/// OBV change over the last `bars` candles, normalised by the average volume
/// of that window. Roughly in [-1, 1]: +1 means every recent bar closed up.
pub fn normalised_slope(candles: &[Candle], bars: usize) -> Option<f64> {
    if bars == 0 || candles.len() < bars + 1 {
        return None;
    }
    let obv = calculate_obv(candles);
    let delta = crate::indicators::change_over(&obv, bars)?;
    let window = &candles[candles.len() - bars..];
    let avg_vol = window.iter().map(|c| c.volume).sum::<f64>() / bars as f64;
    if avg_vol <= 0.0 {
        return Some(0.0);
    }
    let slope = delta / (avg_vol * bars as f64);
    slope.is_finite().then_some(slope)
}
