// =============================================================================
// MACD — Moving Average Convergence / Divergence
// =============================================================================
//
//   line      = EMA(fast) - EMA(slow)
//   signal    = EMA(line, signal_span)
//   histogram = line - signal
//
// Minimum lookback: `slow + signal_span` closes.
// =============================================================================

use crate::indicators::ema::calculate_ema;

/// Tail-aligned MACD series. All three vectors have the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacdSeries {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

impl MacdSeries {
    pub fn last_histogram(&self) -> Option<f64> {
        self.histogram.last().copied()
    }
}

/// Compute MACD for `closes`.
///
/// # Arguments
/// * `closes` - closing prices, oldest first
/// * `fast` / `slow` - EMA spans for the MACD line (12 / 26 by default)
/// * `signal_span` - EMA span applied to the MACD line (9 by default)
///
/// # Returns
/// `None` when `fast >= slow`, any span is zero, there are fewer than
/// `slow + signal_span` closes, or an EMA comes back empty (non-finite input).
pub fn calculate_macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal_span: usize,
) -> Option<MacdSeries> {
    if fast == 0 || signal_span == 0 || fast >= slow || closes.len() < slow + signal_span {
        return None;
    }

    // --- Step 1: fast and slow EMAs ---
    let ema_fast = calculate_ema(closes, fast);
    let ema_slow = calculate_ema(closes, slow);
    if ema_slow.is_empty() || ema_fast.len() < ema_slow.len() {
        return None;
    }

    // --- Step 2: MACD line, fast EMA aligned onto the slow EMA's tail ---
    let offset = ema_fast.len() - ema_slow.len();
    let line: Vec<f64> = ema_slow
        .iter()
        .enumerate()
        .map(|(i, s)| ema_fast[i + offset] - s)
        .collect();

    // --- Step 3: signal line and histogram ---
    let signal = calculate_ema(&line, signal_span);
    if signal.is_empty() {
        return None;
    }

    let line_tail = line[line.len() - signal.len()..].to_vec();
    let histogram: Vec<f64> = line_tail
        .iter()
        .zip(signal.iter())
        .map(|(l, s)| l - s)
        .collect();

    Some(MacdSeries {
        line: line_tail,
        signal,
        histogram,
    })
}
