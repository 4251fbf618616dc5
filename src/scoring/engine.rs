// =============================================================================
// TMV Scoring Engine
// =============================================================================
//
// Pipeline per symbol:
//   1. Precondition: enough candles, finite values.
//   2. Indicator snapshot (computed once).
//   3. Component scores.
//   4. Composite = clamp(w_t*T + w_m*M + w_v*V + w_vol*Vol, 0, 10),
//      then +bonus when momentum bias agrees with the trend direction,
//      -penalty when it opposes it, re-clamped.
//   5. Confidence, regime, reversal probability, signal reasons.
//
// The engine holds no mutable state: identical frames give identical records.
// =============================================================================

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use crate::config::ScoringConfig;
use crate::error::SymbolError;
use crate::indicators::rsi::{self, OVERBOUGHT, OVERSOLD};
use crate::market_data::CandleFrame;
use crate::regime::{classify, RegimeThresholds};
use crate::scoring::components::{
    self, IndicatorSnapshot, MomentumComponent, TrendComponent, SCORE_MAX,
};
use crate::scoring::ScoreRecord;
use crate::types::{round2, TrendDirection};

/// Stateless scorer parameterised by [`ScoringConfig`].
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    cfg: ScoringConfig,
    regime: RegimeThresholds,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

impl ScoringEngine {
    pub fn new(cfg: ScoringConfig) -> Self {
        let regime = RegimeThresholds::from(&cfg);
        Self { cfg, regime }
    }

    /// Candles required before any score is produced: the configured minimum,
    /// or the longest indicator lookback plus the acceleration window if that
    /// is larger.
    pub fn required_candles(&self) -> usize {
        let c = &self.cfg;
        let lookbacks = [
            c.ema_fast,
            c.ema_mid,
            c.ema_slow,
            c.rsi_period + 1 + c.accel_bars,
            c.macd_slow + c.macd_signal + c.accel_bars,
            2 * c.adx_period + 1 + c.accel_bars,
            c.mfi_period + 1 + c.accel_bars,
            c.bb_period + c.accel_bars,
            c.volume_avg_period + 1,
        ];
        lookbacks.into_iter().fold(c.min_candles, usize::max)
    }

    /// Score one symbol.
    ///
    /// Returns `InsufficientData` below [`required_candles`](Self::required_candles)
    /// and `InvalidInput` for non-finite values or degenerate indicator input.
    /// Never panics on bad data.
    pub fn calculate_scores(
        &self,
        symbol: &str,
        frame: &CandleFrame,
        as_of: DateTime<FixedOffset>,
    ) -> Result<ScoreRecord, SymbolError> {
        let need = self.required_candles();
        if frame.len() < need {
            return Err(SymbolError::InsufficientData {
                have: frame.len(),
                need,
            });
        }

        let candles = frame.candles();
        if let Some(bad) = candles
            .iter()
            .position(|c| ![c.open, c.high, c.low, c.close, c.volume].iter().all(|v| v.is_finite()))
        {
            return Err(SymbolError::InvalidInput(format!("non-finite value in candle {bad}")));
        }
        let last = frame
            .last()
            .ok_or(SymbolError::InsufficientData { have: 0, need })?;

        let snap = IndicatorSnapshot::compute(candles, &self.cfg)?;
        let trend = components::trend(&snap, &self.cfg);
        let momentum = components::momentum(&snap, &self.cfg);
        let volume = components::volume(&snap, &self.cfg);
        let volatility = components::volatility(&snap, &self.cfg);

        let tmv = self.composite(&trend, &momentum, volume, volatility);
        let confidence = self.confidence(&snap, &trend, &momentum);
        let regime = classify(snap.dmi.adx, snap.bands.profile.percentile, &self.regime);
        let reversal = self.reversal_probability(&snap);
        let reasons = self.reasons(&snap, &trend);

        let change_pct = if snap.prev_close == 0.0 {
            0.0
        } else {
            (snap.close - snap.prev_close) / snap.prev_close * 100.0
        };

        debug!(
            symbol,
            tmv = format!("{:.2}", tmv),
            trend = format!("{:.2}", trend.score),
            momentum = format!("{:.2}", momentum.score),
            regime = %regime,
            "scored"
        );

        Ok(ScoreRecord {
            symbol: symbol.to_string(),
            tmv_score: round2(tmv),
            trend_score: round2(trend.score),
            momentum_score: round2(momentum.score),
            volume_score: round2(volume),
            volatility_score: round2(volatility),
            confidence: round2(confidence),
            trend_direction: trend.direction,
            regime,
            reversal_probability: round2(reversal),
            signal_reason: reasons,
            candle_time: last.timestamp,
            as_of,
            last_price: round2(snap.close),
            change_pct: round2(change_pct),
        })
    }

    fn composite(&self, t: &TrendComponent, m: &MomentumComponent, volume: f64, volatility: f64) -> f64 {
        let w = &self.cfg.weights;
        let base = (w.trend * t.score + w.momentum * m.score + w.volume * volume + w.volatility * volatility)
            .clamp(0.0, SCORE_MAX);

        let adjusted = match agreement(t.direction, m.bias) {
            Some(true) => base + self.cfg.confirmation_bonus,
            Some(false) => base - self.cfg.conflict_penalty,
            None => base,
        };
        adjusted.clamp(0.0, SCORE_MAX)
    }

    fn confidence(&self, s: &IndicatorSnapshot, t: &TrendComponent, m: &MomentumComponent) -> f64 {
        let c = &self.cfg;
        let mut conf = c.confidence_base;
        if agreement(t.direction, m.bias) == Some(true) {
            conf += c.agreement_bonus;
        }
        if s.dmi.adx >= c.adx_confidence_threshold {
            conf += c.adx_confidence_bonus;
        }
        if s.volume_ratio >= c.volume_ratio_threshold {
            conf += c.volume_confidence_bonus;
        }
        if s.macd_hist_accel.abs() > f64::EPSILON {
            conf += c.macd_accel_bonus;
        }
        conf.clamp(0.0, 1.0)
    }

    fn reversal_probability(&self, s: &IndicatorSnapshot) -> f64 {
        let c = &self.cfg;
        let mut p = c.reversal_base;
        if is_band_extreme(s) {
            p += c.extreme_increment;
        }
        // Exhaustion: still trending but ADX has started to roll over.
        if s.dmi.adx >= c.exhaustion_adx && s.dmi.adx < s.prev_adx {
            p += c.exhaustion_increment;
        }
        if s.bands.profile.is_expanding() {
            p -= c.expansion_decrement;
        }
        p.clamp(0.0, 1.0)
    }

    fn reasons(&self, s: &IndicatorSnapshot, t: &TrendComponent) -> Vec<String> {
        let c = &self.cfg;
        let mut out = Vec::new();

        match t.stack {
            TrendDirection::Bullish => out.push("EMA 8/21/50 stacked bullish".to_string()),
            TrendDirection::Bearish => out.push("EMA 8/21/50 stacked bearish".to_string()),
            TrendDirection::Neutral => {}
        }
        match t.direction {
            TrendDirection::Bullish => out.push(format!("+DI leads -DI by {:.1}", s.dmi.di_spread())),
            TrendDirection::Bearish => out.push(format!("-DI leads +DI by {:.1}", -s.dmi.di_spread())),
            TrendDirection::Neutral => {}
        }
        if s.dmi.adx >= c.trend_adx {
            out.push(format!("ADX {:.1} strong trend", s.dmi.adx));
        } else if s.dmi.adx <= c.range_adx {
            out.push(format!("ADX {:.1} weak trend", s.dmi.adx));
        }
        if s.rsi >= OVERBOUGHT || s.rsi <= OVERSOLD {
            out.push(format!("RSI {:.1} {}", s.rsi, rsi::zone(s.rsi).to_lowercase()));
        }
        if is_band_extreme(s) {
            out.push(if s.rsi >= OVERBOUGHT {
                "close at/above upper band".to_string()
            } else {
                "close at/below lower band".to_string()
            });
        }
        if s.macd_hist_accel > f64::EPSILON {
            out.push("MACD histogram rising".to_string());
        } else if s.macd_hist_accel < -f64::EPSILON {
            out.push("MACD histogram falling".to_string());
        }
        if s.volume_ratio >= c.volume_ratio_threshold {
            out.push(format!("volume {:.2}x {}-bar average", s.volume_ratio, c.volume_avg_period));
        }
        if s.bands.profile.is_expanding() {
            out.push("band width expanding".to_string());
        } else if s.bands.profile.percentile <= 0.1 {
            out.push("band width squeeze".to_string());
        }
        out.push(format!("ATR {:.2}% of price", s.atr_pct));

        out.truncate(c.max_reasons);
        out
    }
}

/// `Some(true)` when both sides point the same non-neutral way, `Some(false)`
/// when they oppose, `None` if either is neutral.
fn agreement(direction: TrendDirection, bias: TrendDirection) -> Option<bool> {
    if direction == TrendDirection::Neutral || bias == TrendDirection::Neutral {
        return None;
    }
    Some(direction == bias)
}

fn is_band_extreme(s: &IndicatorSnapshot) -> bool {
    let band = &s.bands.last;
    (s.rsi >= OVERBOUGHT && band.at_or_above_upper(s.close))
        || (s.rsi <= OVERSOLD && band.at_or_below_lower(s.close))
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::{fixtures, Candle};
    use crate::types::Regime;

    fn as_of() -> DateTime<FixedOffset> {
        fixtures::session_start() + chrono::Duration::minutes(5)
    }

    fn score(frame: &CandleFrame) -> Result<ScoreRecord, SymbolError> {
        ScoringEngine::default().calculate_scores("TEST", frame, as_of())
    }

    #[test]
    fn short_series_is_insufficient() {
        for n in [0, 1, 30, 59] {
            match score(&fixtures::rising(n)) {
                Err(SymbolError::InsufficientData { have, need }) => {
                    assert_eq!(have, n);
                    assert_eq!(need, 60);
                }
                other => panic!("expected InsufficientData for {n}, got {other:?}"),
            }
        }
    }

    #[test]
    fn required_candles_respects_long_periods() {
        let cfg = ScoringConfig {
            ema_slow: 100,
            ..ScoringConfig::default()
        };
        let engine = ScoringEngine::new(cfg);
        assert_eq!(engine.required_candles(), 100);
        assert!(matches!(
            engine.calculate_scores("X", &fixtures::rising(90), as_of()),
            Err(SymbolError::InsufficientData { have: 90, need: 100 })
        ));
    }

    #[test]
    fn non_finite_candle_is_invalid_input() {
        let mut candles = fixtures::rising(90).candles().to_vec();
        candles[40].volume = f64::NAN;
        let frame = CandleFrame::new(candles);
        assert!(matches!(score(&frame), Err(SymbolError::InvalidInput(_))));
    }

    #[test]
    fn rising_series_scores_bullish() {
        let rec = score(&fixtures::rising(90)).unwrap();
        assert_eq!(rec.trend_direction, TrendDirection::Bullish);
        assert!(rec.tmv_score > 5.0, "tmv {}", rec.tmv_score);
        assert!(rec.confidence > 0.35, "confidence {}", rec.confidence);
        assert_eq!(rec.symbol, "TEST");
        assert_eq!(rec.candle_time, fixtures::session_start());
        assert_eq!(rec.as_of, as_of());
        assert!(rec.change_pct > 0.0);
    }

    #[test]
    fn falling_series_scores_low() {
        let rec = score(&fixtures::falling(90)).unwrap();
        assert_eq!(rec.trend_direction, TrendDirection::Bearish);
        assert!(rec.change_pct < 0.0);
    }

    #[test]
    fn oscillating_series_is_range() {
        let rec = score(&fixtures::oscillating(90)).unwrap();
        assert_eq!(rec.regime, Regime::Range);
        assert!(rec.trend_score < 1.0, "trend {}", rec.trend_score);
        assert_eq!(rec.trend_direction, TrendDirection::Neutral);
    }

    #[test]
    fn overbought_at_upper_band_raises_reversal() {
        let calm = score(&fixtures::late_surge(90, 0.0)).unwrap();
        let surged = score(&fixtures::late_surge(90, 20.0)).unwrap();
        assert!(
            surged.reversal_probability > calm.reversal_probability,
            "surged {} vs calm {}",
            surged.reversal_probability,
            calm.reversal_probability
        );
        assert!(surged
            .signal_reason
            .iter()
            .any(|r| r.contains("upper band")));
    }

    #[test]
    fn outputs_stay_in_range() {
        for frame in [
            fixtures::rising(200),
            fixtures::falling(200),
            fixtures::oscillating(200),
            fixtures::late_surge(200, 40.0),
            fixtures::late_surge(60, -30.0),
        ] {
            let rec = score(&frame).unwrap();
            assert!((0.0..=10.0).contains(&rec.tmv_score));
            assert!((0.0..=1.0).contains(&rec.confidence));
            assert!((0.0..=1.0).contains(&rec.reversal_probability));
            assert!(rec.signal_reason.len() <= 6);
        }
    }

    #[test]
    fn scoring_is_idempotent() {
        let frame = fixtures::late_surge(120, 10.0);
        assert_eq!(score(&frame).unwrap(), score(&frame).unwrap());
    }

    #[test]
    fn calendar_gaps_do_not_matter() {
        // Same closes, but with a week-long gap in the middle.
        let frame = fixtures::rising(90);
        let gapped: Vec<Candle> = frame
            .candles()
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mut c = c.clone();
                if i < 45 {
                    c.timestamp = c.timestamp - chrono::Duration::days(7);
                }
                c
            })
            .collect();
        let a = score(&frame).unwrap();
        let b = score(&CandleFrame::new(gapped)).unwrap();
        assert_eq!(a.tmv_score, b.tmv_score);
        assert_eq!(a.signal_reason, b.signal_reason);
    }

    #[test]
    fn agreement_rules() {
        use TrendDirection::*;
        assert_eq!(agreement(Bullish, Bullish), Some(true));
        assert_eq!(agreement(Bullish, Bearish), Some(false));
        assert_eq!(agreement(Neutral, Bullish), None);
        assert_eq!(agreement(Bearish, Neutral), None);
    }

    #[test]
    fn conflict_penalty_lowers_composite() {
        let engine = ScoringEngine::default();
        let t = TrendComponent {
            score: 6.0,
            stack: TrendDirection::Bullish,
            direction: TrendDirection::Bullish,
        };
        let agree = MomentumComponent { score: 6.0, bias: TrendDirection::Bullish };
        let oppose = MomentumComponent { score: 6.0, bias: TrendDirection::Bearish };
        let neutral = MomentumComponent { score: 6.0, bias: TrendDirection::Neutral };

        let base = engine.composite(&t, &neutral, 5.0, 5.0);
        assert!((engine.composite(&t, &agree, 5.0, 5.0) - (base + 0.6)).abs() < 1e-10);
        assert!((engine.composite(&t, &oppose, 5.0, 5.0) - (base - 0.8)).abs() < 1e-10);
    }

    #[test]
    fn composite_is_clamped() {
        let engine = ScoringEngine::default();
        let t = TrendComponent {
            score: 10.0,
            stack: TrendDirection::Bullish,
            direction: TrendDirection::Bullish,
        };
        let m = MomentumComponent { score: 10.0, bias: TrendDirection::Bullish };
        assert_eq!(engine.composite(&t, &m, 10.0, 10.0), 10.0);

        let t0 = TrendComponent { score: 0.0, ..t };
        let m0 = MomentumComponent { score: 0.0, bias: TrendDirection::Bearish };
        assert_eq!(engine.composite(&t0, &m0, 0.0, 0.0), 0.0);
    }
}
