// =============================================================================
// Money Flow Index (MFI)
// =============================================================================
//
// Volume-weighted RSI over typical price:
//   TP        = (H + L + C) / 3
//   raw flow  = TP * volume
//   positive  = sum of raw flow where TP rose, over `period` transitions
//   negative  = sum of raw flow where TP fell
//   MFI       = 100 - 100 / (1 + positive / negative)
//
// Minimum lookback: `period + 1` candles.
// =============================================================================

use crate::market_data::Candle;

/// Tail-aligned MFI series.
///
/// # Arguments
/// * `candles` - OHLCV bars, oldest first
/// * `period` - number of typical-price transitions per window
///
/// # Returns
/// One value per window of `period` transitions; the last element belongs to
/// the last candle. Empty when `period` is zero, there are fewer than
/// `period + 1` candles, or any input or intermediate value is non-finite.
pub fn calculate_mfi(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period + 1 {
        return Vec::new();
    }

    // --- Step 1: typical price ---
    let typical: Vec<f64> = candles
        .iter()
        .map(|c| (c.high + c.low + c.close) / 3.0)
        .collect();

    if !typical.iter().zip(candles).all(|(tp, c)| tp.is_finite() && c.volume.is_finite()) {
        return Vec::new();
    }

    // --- Step 2: signed flow per transition (+ rising TP, - falling, 0 flat) ---
    let flows: Vec<f64> = (1..candles.len())
        .map(|i| {
            let raw = typical[i] * candles[i].volume;
            if typical[i] > typical[i - 1] {
                raw
            } else if typical[i] < typical[i - 1] {
                -raw
            } else {
                0.0
            }
        })
        .collect();

    // --- Step 3: money ratio per window ---
    let mut out = Vec::with_capacity(flows.len() - period + 1);
    for window in flows.windows(period) {
        let positive: f64 = window.iter().filter(|f| **f > 0.0).sum();
        let negative: f64 = window.iter().filter(|f| **f < 0.0).map(|f| -f).sum();

        let mfi = if positive == 0.0 && negative == 0.0 {
            50.0
        } else if negative == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + positive / negative)
        };

        if !mfi.is_finite() {
            return Vec::new();
        }
        out.push(mfi);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::fixtures;

    fn candles(closes: &[f64]) -> Vec<Candle> {
        fixtures::build(
            closes,
            &vec![1_000.0; closes.len()],
            fixtures::session_start(),
            chrono::Duration::days(1),
        )
    }

    #[test]
    fn mfi_insufficient_data() {
        let closes: Vec<f64> = (1..=14).map(|x| x as f64).collect();
        assert!(calculate_mfi(&candles(&closes), 14).is_empty());
    }

    #[test]
    fn mfi_rising_is_100() {
        let closes: Vec<f64> = (1..=30).map(|x| 100.0 + x as f64).collect();
        let s = calculate_mfi(&candles(&closes), 14);
        assert_eq!(s.len(), 16);
        assert!((s.last().unwrap() - 100.0).abs() < 1e-10);
    }

    #[test]
    fn mfi_falling_is_0() {
        let closes: Vec<f64> = (1..=30).rev().map(|x| 100.0 + x as f64).collect();
        let s = calculate_mfi(&candles(&closes), 14);
        assert!(s.last().unwrap().abs() < 1e-10);
    }

    #[test]
    fn non_finite_bar_empties_series() {
        let closes: Vec<f64> = (1..=30).map(|x| 100.0 + x as f64).collect();
        let mut c = candles(&closes);
        c[20].high = f64::NAN;
        assert!(calculate_mfi(&c, 14).is_empty());

        let mut c = candles(&closes);
        c[25].volume = f64::NAN;
        assert!(calculate_mfi(&c, 14).is_empty());
    }

    #[test]
    fn mfi_range_check() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.5).sin() * 4.0).collect();
        for v in calculate_mfi(&candles(&closes), 14) {
            assert!((0.0..=100.0).contains(&v));
        }
    }
}
