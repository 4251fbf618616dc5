// =============================================================================
// Scoring Module
// =============================================================================
//
// Turns one symbol's candle frame into a `ScoreRecord`:
// - components: trend / momentum / volume / volatility scores on [0, 10]
// - engine:     composite TMV, confidence, regime, reversal probability

pub mod components;
pub mod engine;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::types::{Regime, TrendDirection};

pub use engine::ScoringEngine;

/// Output of one scoring pass. A pure function of the candle frame and the
/// run's `as_of`; replaced wholesale on the next run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub symbol: String,
    pub tmv_score: f64,
    pub trend_score: f64,
    pub momentum_score: f64,
    pub volume_score: f64,
    pub volatility_score: f64,
    /// [0, 1]
    pub confidence: f64,
    pub trend_direction: TrendDirection,
    pub regime: Regime,
    /// [0, 1]
    pub reversal_probability: f64,
    /// Human-readable contributing conditions, most significant first.
    pub signal_reason: Vec<String>,
    /// Timestamp of the last candle.
    pub candle_time: DateTime<FixedOffset>,
    pub as_of: DateTime<FixedOffset>,
    pub last_price: f64,
    /// Last close versus the previous close, in percent.
    pub change_pct: f64,
}
