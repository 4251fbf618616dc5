// =============================================================================
// Component Scores
// =============================================================================
//
// Each component starts from a fixed centre and adds clamped adjustments:
//
//   Trend       0 + EMA alignment + DI confirmation + ADX above floor + slope
//   Momentum    5 + RSI level + RSI accel + MACD hist level + MACD hist accel
//   Volume      4 + volume ratio + OBV slope + MFI level + MFI accel
//   Volatility  5 + width percentile vs median + width expansion
//
// All components are clamped to [0, 10]. "Accel" is the change over the last
// `accel_bars` candles.
// =============================================================================

use crate::config::ScoringConfig;
use crate::error::SymbolError;
use crate::indicators::adx::{calculate_adx, DirectionalPoint};
use crate::indicators::atr::calculate_atr_pct;
use crate::indicators::ema::{calculate_ema, slope_pct};
use crate::indicators::macd::calculate_macd;
use crate::indicators::mfi::calculate_mfi;
use crate::indicators::obv::normalised_slope;
use crate::indicators::rsi::calculate_rsi;
use crate::indicators::change_over;
use crate::market_data::Candle;
use crate::regime::{band_context, BandContext};
use crate::types::TrendDirection;

/// Upper bound of every component score.
pub const SCORE_MAX: f64 = 10.0;

const MOMENTUM_CENTRE: f64 = 5.0;
const VOLUME_CENTRE: f64 = 4.0;
const VOLATILITY_CENTRE: f64 = 5.0;

// =============================================================================
// IndicatorSnapshot
// =============================================================================

/// Every indicator value the components need, computed once per symbol.
#[derive(Debug, Clone)]
pub struct IndicatorSnapshot {
    pub close: f64,
    pub prev_close: f64,
    pub ema_fast: f64,
    pub ema_mid: f64,
    pub ema_slow: f64,
    /// EMA-mid slope over `slope_bars`, percent.
    pub ema_mid_slope_pct: f64,
    pub dmi: DirectionalPoint,
    /// ADX `accel_bars` candles ago.
    pub prev_adx: f64,
    pub rsi: f64,
    pub rsi_accel: f64,
    pub macd_hist: f64,
    pub macd_hist_accel: f64,
    pub volume_ratio: f64,
    pub obv_slope: f64,
    pub mfi: f64,
    pub mfi_accel: f64,
    pub bands: BandContext,
    pub atr_pct: f64,
}

impl IndicatorSnapshot {
    /// Compute the snapshot. The caller has already checked the candle count,
    /// so a missing indicator here means degenerate input.
    pub fn compute(candles: &[Candle], cfg: &ScoringConfig) -> Result<Self, SymbolError> {
        let undefined = |name: &str| SymbolError::InvalidInput(format!("{name} undefined for series"));
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        let n = closes.len();
        if n < 2 {
            return Err(SymbolError::InsufficientData { have: n, need: 2 });
        }
        let close = closes[n - 1];
        let prev_close = closes[n - 2];

        let ema_fast = *calculate_ema(&closes, cfg.ema_fast).last().ok_or_else(|| undefined("EMA fast"))?;
        let mid_series = calculate_ema(&closes, cfg.ema_mid);
        let ema_mid = *mid_series.last().ok_or_else(|| undefined("EMA mid"))?;
        let ema_slow = *calculate_ema(&closes, cfg.ema_slow).last().ok_or_else(|| undefined("EMA slow"))?;
        let ema_mid_slope_pct = slope_pct(&mid_series, cfg.slope_bars).unwrap_or(0.0);

        let dmi_series = calculate_adx(candles, cfg.adx_period);
        let dmi = *dmi_series.last().ok_or_else(|| undefined("ADX"))?;
        let prev_adx = dmi_series
            .len()
            .checked_sub(cfg.accel_bars + 1)
            .map(|i| dmi_series[i].adx)
            .unwrap_or(dmi.adx);

        let rsi_series = calculate_rsi(&closes, cfg.rsi_period);
        let rsi = *rsi_series.last().ok_or_else(|| undefined("RSI"))?;

        let macd = calculate_macd(&closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal)
            .ok_or_else(|| undefined("MACD"))?;
        let macd_hist = macd.last_histogram().ok_or_else(|| undefined("MACD"))?;

        let mfi_series = calculate_mfi(candles, cfg.mfi_period);
        let mfi = *mfi_series.last().ok_or_else(|| undefined("MFI"))?;

        let bands = band_context(
            &closes,
            cfg.bb_period,
            cfg.bb_mult,
            cfg.width_window,
            cfg.accel_bars,
        )
        .ok_or_else(|| undefined("Bollinger"))?;

        Ok(Self {
            close,
            prev_close,
            ema_fast,
            ema_mid,
            ema_slow,
            ema_mid_slope_pct,
            dmi,
            prev_adx,
            rsi,
            rsi_accel: accel(&rsi_series, cfg.accel_bars),
            macd_hist,
            macd_hist_accel: accel(&macd.histogram, cfg.accel_bars),
            volume_ratio: volume_ratio(candles, cfg.volume_avg_period),
            obv_slope: normalised_slope(candles, cfg.accel_bars).unwrap_or(0.0),
            mfi,
            mfi_accel: accel(&mfi_series, cfg.accel_bars),
            bands,
            atr_pct: calculate_atr_pct(candles, cfg.atr_period).unwrap_or(0.0),
        })
    }

    /// `value` as a percentage of the last close.
    fn pct_of_price(&self, value: f64) -> f64 {
        if self.close == 0.0 {
            0.0
        } else {
            value / self.close * 100.0
        }
    }
}

fn accel(series: &[f64], bars: usize) -> f64 {
    change_over(series, bars).unwrap_or(0.0)
}

/// Last volume over the average of the preceding `period` volumes.
fn volume_ratio(candles: &[Candle], period: usize) -> f64 {
    let n = candles.len();
    if period == 0 || n < period + 1 {
        return 1.0;
    }
    let avg = candles[n - 1 - period..n - 1].iter().map(|c| c.volume).sum::<f64>() / period as f64;
    if avg <= 0.0 {
        return 1.0;
    }
    let ratio = candles[n - 1].volume / avg;
    if ratio.is_finite() {
        ratio
    } else {
        1.0
    }
}

// =============================================================================
// Trend
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendComponent {
    pub score: f64,
    /// EMA stack ordering, before DI confirmation.
    pub stack: TrendDirection,
    /// Stack confirmed by DI dominance; `Neutral` otherwise.
    pub direction: TrendDirection,
}

pub fn trend(s: &IndicatorSnapshot, cfg: &ScoringConfig) -> TrendComponent {
    let separation = s.pct_of_price((s.ema_mid - s.ema_slow).abs());
    let separated = separation >= cfg.min_ema_separation_pct;

    let stack = if separated && s.close > s.ema_mid && s.ema_mid > s.ema_slow && s.ema_fast > s.ema_mid {
        TrendDirection::Bullish
    } else if separated && s.close < s.ema_mid && s.ema_mid < s.ema_slow && s.ema_fast < s.ema_mid {
        TrendDirection::Bearish
    } else {
        TrendDirection::Neutral
    };

    let di_confirms = match stack {
        TrendDirection::Bullish => s.dmi.plus_di > s.dmi.minus_di,
        TrendDirection::Bearish => s.dmi.minus_di > s.dmi.plus_di,
        TrendDirection::Neutral => false,
    };
    let direction = if di_confirms { stack } else { TrendDirection::Neutral };

    let mut score = 0.0;
    if stack != TrendDirection::Neutral {
        score += cfg.alignment_bonus;
    }
    if di_confirms {
        score += cfg.di_bonus;
    }
    score += ((s.dmi.adx - cfg.adx_floor) * cfg.adx_scale).clamp(0.0, cfg.adx_cap);
    score += s.ema_mid_slope_pct.abs().min(cfg.slope_cap);

    TrendComponent {
        score: score.clamp(0.0, SCORE_MAX),
        stack,
        direction,
    }
}

// =============================================================================
// Momentum
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentumComponent {
    pub score: f64,
    pub bias: TrendDirection,
}

pub fn momentum(s: &IndicatorSnapshot, cfg: &ScoringConfig) -> MomentumComponent {
    let rsi_level = ((s.rsi - 50.0) / 5.0).clamp(-cfg.rsi_clamp, cfg.rsi_clamp);
    let rsi_accel = (s.rsi_accel / 5.0).clamp(-cfg.rsi_accel_clamp, cfg.rsi_accel_clamp);
    let hist_level = (s.pct_of_price(s.macd_hist) * 5.0).clamp(-cfg.macd_clamp, cfg.macd_clamp);
    let hist_accel =
        (s.pct_of_price(s.macd_hist_accel) * 10.0).clamp(-cfg.macd_accel_clamp, cfg.macd_accel_clamp);

    let score = (MOMENTUM_CENTRE + rsi_level + rsi_accel + hist_level + hist_accel).clamp(0.0, SCORE_MAX);

    let bias = if score > MOMENTUM_CENTRE + cfg.momentum_bias_band {
        TrendDirection::Bullish
    } else if score < MOMENTUM_CENTRE - cfg.momentum_bias_band {
        TrendDirection::Bearish
    } else {
        TrendDirection::Neutral
    };

    MomentumComponent { score, bias }
}

// =============================================================================
// Volume / Volatility
// =============================================================================

pub fn volume(s: &IndicatorSnapshot, cfg: &ScoringConfig) -> f64 {
    let ratio = ((s.volume_ratio - 1.0) * 2.0).clamp(-cfg.volume_ratio_clamp, cfg.volume_ratio_clamp);
    let obv = (s.obv_slope * cfg.obv_clamp).clamp(-cfg.obv_clamp, cfg.obv_clamp);
    let mfi_level = ((s.mfi - 50.0) / 25.0).clamp(-cfg.mfi_clamp, cfg.mfi_clamp);
    let mfi_accel = (s.mfi_accel / 10.0).clamp(-cfg.mfi_accel_clamp, cfg.mfi_accel_clamp);

    (VOLUME_CENTRE + ratio + obv + mfi_level + mfi_accel).clamp(0.0, SCORE_MAX)
}

pub fn volatility(s: &IndicatorSnapshot, cfg: &ScoringConfig) -> f64 {
    let profile = &s.bands.profile;
    let rank = (profile.percentile - 0.5) * cfg.width_rank_scale;
    let expansion = (profile.expansion * 5.0).clamp(-cfg.expansion_clamp, cfg.expansion_clamp);

    (VOLATILITY_CENTRE + rank + expansion).clamp(0.0, SCORE_MAX)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::fixtures;

    fn snapshot(frame: &crate::market_data::CandleFrame) -> IndicatorSnapshot {
        IndicatorSnapshot::compute(frame.candles(), &ScoringConfig::default()).unwrap()
    }

    #[test]
    fn rising_series_is_bullish_and_strong() {
        let cfg = ScoringConfig::default();
        let s = snapshot(&fixtures::rising(90));
        let t = trend(&s, &cfg);
        assert_eq!(t.stack, TrendDirection::Bullish);
        assert_eq!(t.direction, TrendDirection::Bullish);
        assert!(t.score > 8.0, "trend score {}", t.score);

        let m = momentum(&s, &cfg);
        assert_eq!(m.bias, TrendDirection::Bullish);
        assert!(volume(&s, &cfg) > VOLUME_CENTRE);
    }

    #[test]
    fn falling_series_is_bearish() {
        let cfg = ScoringConfig::default();
        let s = snapshot(&fixtures::falling(90));
        assert_eq!(trend(&s, &cfg).direction, TrendDirection::Bearish);
        assert_eq!(momentum(&s, &cfg).bias, TrendDirection::Bearish);
    }

    #[test]
    fn oscillating_series_has_no_trend() {
        let cfg = ScoringConfig::default();
        let s = snapshot(&fixtures::oscillating(90));
        assert!(s.dmi.adx < 15.0);
        let t = trend(&s, &cfg);
        assert_eq!(t.stack, TrendDirection::Neutral);
        assert!(t.score < 1.0, "trend score {}", t.score);
    }

    #[test]
    fn stack_needs_minimum_ema_separation() {
        let s = snapshot(&fixtures::rising(90));
        let mut cfg = ScoringConfig::default();
        cfg.min_ema_separation_pct = 0.0;
        assert_eq!(trend(&s, &cfg).stack, TrendDirection::Bullish);

        cfg.min_ema_separation_pct = 1_000.0;
        let t = trend(&s, &cfg);
        assert_eq!(t.stack, TrendDirection::Neutral);
        assert_eq!(t.direction, TrendDirection::Neutral);
    }

    #[test]
    fn components_stay_in_range() {
        let cfg = ScoringConfig::default();
        for frame in [
            fixtures::rising(120),
            fixtures::falling(120),
            fixtures::oscillating(120),
            fixtures::late_surge(120, 25.0),
        ] {
            let s = snapshot(&frame);
            for v in [
                trend(&s, &cfg).score,
                momentum(&s, &cfg).score,
                volume(&s, &cfg),
                volatility(&s, &cfg),
            ] {
                assert!((0.0..=SCORE_MAX).contains(&v), "component {v} out of range");
            }
        }
    }

    #[test]
    fn volume_ratio_handles_zero_average() {
        let frame = fixtures::daily(&[1.0, 2.0, 3.0], &[0.0, 0.0, 5.0], fixtures::session_start());
        assert_eq!(volume_ratio(frame.candles(), 2), 1.0);
        let frame = fixtures::daily(&[1.0, 2.0, 3.0], &[10.0, 10.0, 25.0], fixtures::session_start());
        assert!((volume_ratio(frame.candles(), 2) - 2.5).abs() < 1e-12);
    }
}
