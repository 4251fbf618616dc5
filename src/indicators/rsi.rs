// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// Step 1 — Compute price deltas from consecutive closes.
// Step 2 — Seed average gain / loss with the SMA of the first `period` deltas.
// Step 3 — Wilder's smoothing:
//            avg = (prev_avg * (period - 1) + current) / period
// Step 4 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// Minimum lookback: `period + 1` closes.
// =============================================================================

/// RSI at or above this is overbought.
pub const OVERBOUGHT: f64 = 70.0;
/// RSI at or below this is oversold.
pub const OVERSOLD: f64 = 30.0;

/// Compute the full RSI series for `closes` and `period`.
///
/// # Arguments
/// * `closes` - closing prices, oldest first
/// * `period` - smoothing window (14 in the scoring engine)
///
/// # Returns
/// One value per close starting at index `period`, so the last element lines
/// up with the last close.
///
/// # Edge cases
/// - `period == 0` or fewer than `period + 1` closes => empty vec
/// - no down moves => 100.0, no movement at all => 50.0
/// - a non-finite value anywhere => empty vec
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }
    // `f64::max` below would read a NaN delta as zero.
    if !closes.iter().all(|c| c.is_finite()) {
        return Vec::new();
    }

    // --- Compute price deltas ------------------------------------------------
    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    // --- Seed averages with SMA of first `period` deltas ---------------------
    let (sum_gain, sum_loss) = deltas[..period]
        .iter()
        .fold((0.0_f64, 0.0_f64), |(g, l), &d| {
            if d > 0.0 {
                (g + d, l)
            } else {
                (g, l + d.abs())
            }
        });

    let period_f = period as f64;
    let mut avg_gain = sum_gain / period_f;
    let mut avg_loss = sum_loss / period_f;

    let Some(first) = rsi_from_averages(avg_gain, avg_loss) else {
        return Vec::new();
    };

    let mut result = Vec::with_capacity(deltas.len() - period + 1);
    result.push(first);

    // --- Wilder's smoothing for subsequent values ----------------------------
    for &delta in &deltas[period..] {
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);

        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;

        match rsi_from_averages(avg_gain, avg_loss) {
            Some(rsi) => result.push(rsi),
            None => return Vec::new(),
        }
    }

    result
}

/// Human-readable zone for an RSI value.
pub fn zone(rsi: f64) -> &'static str {
    if rsi >= OVERBOUGHT {
        "OVERBOUGHT"
    } else if rsi <= OVERSOLD {
        "OVERSOLD"
    } else {
        "NEUTRAL"
    }
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    rsi.is_finite().then_some(rsi)
}
