// =============================================================================
// Baseline Tracker
// =============================================================================
//
// One reference snapshot per (date, symbol), captured inside a short window
// after the session opens. Later runs report drift against it.
//
// - Capture is idempotent: a (date, symbol) that already has a baseline is
//   never rewritten.
// - A symbol without a baseline gets no delta at all (`None`), which is
//   different from a zero delta.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::BaselineConfig;
use crate::error::StoreError;
use crate::scoring::ScoreRecord;
use crate::types::round2;

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub date: NaiveDate,
    pub symbol: String,
    pub tmv_score: f64,
    pub trend_score: f64,
    pub momentum_score: f64,
    pub volume_score: f64,
    pub volatility_score: f64,
    pub captured_at: DateTime<FixedOffset>,
}

impl BaselineRecord {
    pub fn from_score(date: NaiveDate, score: &ScoreRecord, captured_at: DateTime<FixedOffset>) -> Self {
        Self {
            date,
            symbol: score.symbol.clone(),
            tmv_score: score.tmv_score,
            trend_score: score.trend_score,
            momentum_score: score.momentum_score,
            volume_score: score.volume_score,
            volatility_score: score.volatility_score,
            captured_at,
        }
    }
}

/// Current score minus the day's baseline, every field rounded to 2 dp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaRecord {
    pub symbol: String,
    pub tmv_delta: f64,
    pub trend_delta: f64,
    pub momentum_delta: f64,
    pub volume_delta: f64,
    pub volatility_delta: f64,
}

impl DeltaRecord {
    /// `None` when the baseline belongs to a different symbol.
    pub fn between(current: &ScoreRecord, baseline: &BaselineRecord) -> Option<Self> {
        if current.symbol != baseline.symbol {
            return None;
        }
        Some(Self {
            symbol: current.symbol.clone(),
            tmv_delta: round2(current.tmv_score - baseline.tmv_score),
            trend_delta: round2(current.trend_score - baseline.trend_score),
            momentum_delta: round2(current.momentum_score - baseline.momentum_score),
            volume_delta: round2(current.volume_score - baseline.volume_score),
            volatility_delta: round2(current.volatility_score - baseline.volatility_score),
        })
    }
}

// =============================================================================
// Store interface
// =============================================================================

/// Persistent home of the baseline table.
#[async_trait]
pub trait BaselineStore: Send + Sync {
    /// All baselines captured on `date`.
    async fn load_baselines(&self, date: NaiveDate) -> Result<Vec<BaselineRecord>, StoreError>;

    /// Insert every record whose (date, symbol) is not stored yet and return
    /// how many were added. Existing records are left untouched.
    async fn insert_missing(&self, records: &[BaselineRecord]) -> Result<usize, StoreError>;
}

// =============================================================================
// Tracker
// =============================================================================

/// Local wall-clock window (both ends inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl CaptureWindow {
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }
}

impl From<&BaselineConfig> for CaptureWindow {
    fn from(cfg: &BaselineConfig) -> Self {
        Self {
            start: cfg.capture_start,
            end: cfg.capture_end,
        }
    }
}

pub struct BaselineTracker {
    store: Arc<dyn BaselineStore>,
    window: CaptureWindow,
}

impl BaselineTracker {
    pub fn new(store: Arc<dyn BaselineStore>, window: CaptureWindow) -> Self {
        Self { store, window }
    }

    /// `now` must already be in exchange-local time.
    pub fn in_capture_window(&self, now: DateTime<FixedOffset>) -> bool {
        self.window.contains(now.time())
    }

    /// Capture baselines for every scored symbol that has none for `now`'s
    /// date. Returns the number of new baselines.
    pub async fn capture(&self, scores: &[ScoreRecord], now: DateTime<FixedOffset>) -> Result<usize, StoreError> {
        let date = now.date_naive();
        let existing = self.store.load_baselines(date).await?;

        let missing: Vec<BaselineRecord> = scores
            .iter()
            .filter(|s| !existing.iter().any(|b| b.symbol == s.symbol))
            .map(|s| BaselineRecord::from_score(date, s, now))
            .collect();

        if missing.is_empty() {
            debug!(%date, "baselines already captured");
            return Ok(0);
        }

        let inserted = self.store.insert_missing(&missing).await?;
        info!(%date, inserted, "baselines captured");
        Ok(inserted)
    }

    /// Deltas against `date`'s baselines, keyed by symbol. Symbols without a
    /// baseline are absent from the map.
    pub async fn deltas(
        &self,
        date: NaiveDate,
        scores: &[ScoreRecord],
    ) -> Result<HashMap<String, DeltaRecord>, StoreError> {
        let baselines: HashMap<String, BaselineRecord> = self
            .store
            .load_baselines(date)
            .await?
            .into_iter()
            .map(|b| (b.symbol.clone(), b))
            .collect();

        Ok(scores
            .iter()
            .filter_map(|s| {
                baselines
                    .get(&s.symbol)
                    .and_then(|b| DeltaRecord::between(s, b))
                    .map(|d| (s.symbol.clone(), d))
            })
            .collect())
    }
}
