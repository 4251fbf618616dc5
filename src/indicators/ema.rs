// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices:
//   multiplier = 2 / (span + 1)
//   EMA_t      = x_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The first EMA value is seeded with the SMA of the first `span` inputs, so
// the minimum lookback is `span` points.
// =============================================================================

/// Compute the EMA series for `values` and look-back `span`.
///
/// # Arguments
/// * `values` - ascending input series (usually closes)
/// * `span`   - smoothing span; also the minimum lookback
///
/// # Returns
/// `values.len() - span + 1` points, tail-aligned with the input. Empty when
/// `span == 0`, the input is shorter than `span`, or any value is non-finite.
pub fn calculate_ema(values: &[f64], span: usize) -> Vec<f64> {
    if span == 0 || values.len() < span {
        return Vec::new();
    }

    let multiplier = 2.0 / (span + 1) as f64;

    // --- Step 1: seed with the SMA of the first `span` values ---
    let seed: f64 = values[..span].iter().sum::<f64>() / span as f64;
    if !seed.is_finite() {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(values.len() - span + 1);
    result.push(seed);

    // --- Step 2: recursive smoothing ---
    let mut prev = seed;
    for &x in &values[span..] {
        let ema = x * multiplier + prev * (1.0 - multiplier);
        if !ema.is_finite() {
            return Vec::new();
        }
        result.push(ema);
        prev = ema;
    }

    result
}

/// Percentage change of an EMA series over the last `bars` steps, relative to
/// the earlier value. `None` when there are too few points or the base is 0.
pub fn slope_pct(series: &[f64], bars: usize) -> Option<f64> {
    let n = series.len();
    if bars == 0 || n < bars + 1 {
        return None;
    }
    let base = series[n - 1 - bars];
    if base == 0.0 {
        return None;
    }
    let pct = (series[n - 1] - base) / base * 100.0;
    pct.is_finite().then_some(pct)
}
