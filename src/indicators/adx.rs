// =============================================================================
// Average Directional Index (ADX) with +DI / -DI
// =============================================================================
//
// Calculation pipeline:
//   1. Compute +DM, -DM and True Range per bar transition.
//   2. Wilder-smooth (period) +DM, -DM and TR.
//   3. +DI = smoothed(+DM) / smoothed(TR) * 100
//      -DI = smoothed(-DM) / smoothed(TR) * 100
//   4. DX  = |+DI - -DI| / (+DI + -DI) * 100
//   5. ADX = Wilder's smoothed average of DX over `period` values.
//
// Interpretation:
//   ADX > 25  => trending market
//   ADX < 20  => ranging / choppy market
//
// Minimum lookback: `2 * period + 1` candles.
// =============================================================================

use crate::indicators::atr::true_range;
use crate::market_data::Candle;

/// One point of the directional-movement system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalPoint {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

impl DirectionalPoint {
    /// `+DI - -DI`; positive when buyers dominate.
    pub fn di_spread(&self) -> f64 {
        self.plus_di - self.minus_di
    }
}

/// Compute the ADX / DI series, tail-aligned to `candles`.
///
/// # Arguments
/// * `candles` - OHLC bars, oldest first
/// * `period` - Wilder smoothing period (14 in the scoring engine)
///
/// # Returns
/// One [`DirectionalPoint`] per candle from index `2 * period - 1` on. Empty when
/// `period` is zero, there are fewer than `2 * period + 1` candles, or a
/// non-finite value appears anywhere in the pipeline.
pub fn calculate_adx(candles: &[Candle], period: usize) -> Vec<DirectionalPoint> {
    if period == 0 || candles.len() < 2 * period + 1 {
        return Vec::new();
    }

    let period_f = period as f64;

    // ------------------------------------------------------------------
    // Step 1: raw +DM, -DM and True Range for each consecutive pair
    // ------------------------------------------------------------------
    let transitions = candles.len() - 1;
    let mut plus_dm = Vec::with_capacity(transitions);
    let mut minus_dm = Vec::with_capacity(transitions);
    let mut tr_vals = Vec::with_capacity(transitions);

    for pair in candles.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);

        let Some(tr) = true_range(prev, cur) else {
            return Vec::new();
        };
        if !(cur.high - prev.high).is_finite() || !(prev.low - cur.low).is_finite() {
            return Vec::new();
        }

        let up_move = cur.high - prev.high;
        let down_move = prev.low - cur.low;

        plus_dm.push(if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 });
        minus_dm.push(if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 });
        tr_vals.push(tr);
    }

    // ------------------------------------------------------------------
    // Step 2-4: Wilder smoothing, DI and DX per transition
    // ------------------------------------------------------------------
    let mut s_plus: f64 = plus_dm[..period].iter().sum();
    let mut s_minus: f64 = minus_dm[..period].iter().sum();
    let mut s_tr: f64 = tr_vals[..period].iter().sum();

    let mut di_points: Vec<(f64, f64, f64)> = Vec::with_capacity(transitions - period + 1);
    match directional(s_plus, s_minus, s_tr) {
        Some(p) => di_points.push(p),
        None => return Vec::new(),
    }

    for i in period..transitions {
        s_plus = s_plus - s_plus / period_f + plus_dm[i];
        s_minus = s_minus - s_minus / period_f + minus_dm[i];
        s_tr = s_tr - s_tr / period_f + tr_vals[i];

        match directional(s_plus, s_minus, s_tr) {
            Some(p) => di_points.push(p),
            None => return Vec::new(),
        }
    }

    if di_points.len() < period {
        return Vec::new();
    }

    // ------------------------------------------------------------------
    // Step 5: ADX = Wilder's smoothed average of DX
    // ------------------------------------------------------------------
    let mut adx = di_points[..period].iter().map(|p| p.2).sum::<f64>() / period_f;
    if !adx.is_finite() {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(di_points.len() - period + 1);
    let (pdi, mdi, _) = di_points[period - 1];
    out.push(DirectionalPoint {
        adx,
        plus_di: pdi,
        minus_di: mdi,
    });

    for &(pdi, mdi, dx) in &di_points[period..] {
        adx = (adx * (period_f - 1.0) + dx) / period_f;
        if !adx.is_finite() {
            return Vec::new();
        }
        out.push(DirectionalPoint {
            adx,
            plus_di: pdi,
            minus_di: mdi,
        });
    }

    out
}

// =============================================================================
// Internal helpers
// =============================================================================

/// `(+DI, -DI, DX)` from smoothed +DM, -DM and TR. A zero TR (no range at all)
/// yields zero directional movement.
fn directional(s_plus: f64, s_minus: f64, s_tr: f64) -> Option<(f64, f64, f64)> {
    if s_tr == 0.0 {
        return Some((0.0, 0.0, 0.0));
    }

    let plus_di = s_plus / s_tr * 100.0;
    let minus_di = s_minus / s_tr * 100.0;
    let di_sum = plus_di + minus_di;

    let dx = if di_sum == 0.0 {
        0.0
    } else {
        (plus_di - minus_di).abs() / di_sum * 100.0
    };

    (plus_di.is_finite() && minus_di.is_finite() && dx.is_finite())
        .then_some((plus_di, minus_di, dx))
}
