// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Bollinger Bands consist of a middle band (SMA), an upper band (SMA + k*σ),
// and a lower band (SMA - k*σ). The Band Width (BBW) is the normalised
// distance: BBW = (upper - lower) / middle * 100.
//
// BBW feeds both the volatility component and the regime classifier.
// Minimum lookback: `period` closes.

/// One Bollinger Band point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerResult {
    pub lower: f64,
    pub middle: f64,
    pub upper: f64,
    pub width: f64,
}

impl BollingerResult {
    /// `true` when `price` sits on or above the upper band.
    pub fn at_or_above_upper(&self, price: f64) -> bool {
        price >= self.upper
    }

    /// `true` when `price` sits on or below the lower band.
    pub fn at_or_below_lower(&self, price: f64) -> bool {
        price <= self.lower
    }
}

/// Rolling Bollinger series, tail-aligned to `closes`.
///
/// # Arguments
/// * `closes`  - ascending close prices
/// * `period`  - SMA window; also the minimum lookback
/// * `num_std` - band half-width in standard deviations
///
/// # Returns
/// One point per complete window, the last one matching the last close.
/// Empty when:
/// - Fewer than `period` data points.
/// - Any window is degenerate (zero middle band or non-finite width).
pub fn calculate_bollinger_series(closes: &[f64], period: usize, num_std: f64) -> Vec<BollingerResult> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }
    closes
        .windows(period)
        .map(|w| band(w, num_std))
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default()
}

fn band(window: &[f64], num_std: f64) -> Option<BollingerResult> {
    let n = window.len() as f64;
    let middle = window.iter().sum::<f64>() / n;
    if middle == 0.0 {
        return None;
    }

    // Population standard deviation.
    let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    let upper = middle + num_std * std_dev;
    let lower = middle - num_std * std_dev;
    let width = (upper - lower) / middle * 100.0;

    width.is_finite().then_some(BollingerResult {
        lower,
        middle,
        upper,
        width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<BollingerResult> {
        closes
            .len()
            .checked_sub(period)
            .and_then(|start| band(&closes[start..], num_std))
    }

    #[test]
    fn bollinger_basic() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let bb = calculate_bollinger(&closes, 20, 2.0).unwrap();
        assert!(bb.upper > bb.middle);
        assert!(bb.lower < bb.middle);
        assert!(bb.width > 0.0);
    }

    #[test]
    fn bollinger_insufficient_data() {
        let closes = vec![1.0, 2.0, 3.0];
        assert!(calculate_bollinger(&closes, 20, 2.0).is_none());
        assert!(calculate_bollinger_series(&closes, 20, 2.0).is_empty());
    }

    #[test]
    fn bollinger_flat() {
        let closes = vec![100.0; 20];
        let bb = calculate_bollinger(&closes, 20, 2.0).unwrap();
        assert!(bb.width.abs() < 1e-10);
        assert!(bb.at_or_above_upper(100.0));
        assert!(bb.at_or_below_lower(100.0));
    }

    #[test]
    fn series_is_tail_aligned() {
        let closes: Vec<f64> = (0..50).map(|i| 100.0 + (i as f64 * 0.4).sin() * 3.0).collect();
        let series = calculate_bollinger_series(&closes, 20, 2.0);
        assert_eq!(series.len(), 31);
        assert_eq!(series.last().copied(), calculate_bollinger(&closes, 20, 2.0));
    }

    #[test]
    fn degenerate_window_empties_series() {
        let closes = vec![0.0, 0.0, 1.0, 2.0];
        assert!(calculate_bollinger_series(&closes, 2, 2.0).is_empty());

        // [3, -3] has a zero middle band; the windows after it are fine.
        let closes = vec![1.0, 2.0, 3.0, -3.0, 4.0, 5.0];
        assert!(calculate_bollinger_series(&closes, 2, 2.0).is_empty());
    }
}
