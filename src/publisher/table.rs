// =============================================================================
// Published table, run report and watchdog marker
// =============================================================================

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::baseline::DeltaRecord;
use crate::scoring::ScoreRecord;
use crate::types::DataQuality;

/// One published row: the score, its delta (if a baseline exists) and its
/// freshness tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedRow {
    /// 1-based position by TMV score.
    pub rank: usize,
    #[serde(flatten)]
    pub score: ScoreRecord,
    pub delta: Option<DeltaRecord>,
    pub data_quality: DataQuality,
}

/// The full ranking for one run. Always replaced as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedTable {
    pub run_id: Uuid,
    pub as_of: DateTime<FixedOffset>,
    pub rows: Vec<PublishedRow>,
}

impl PublishedTable {
    /// Sort by TMV score descending (ties by symbol) and assign ranks.
    pub fn assemble(
        run_id: Uuid,
        as_of: DateTime<FixedOffset>,
        mut rows: Vec<(ScoreRecord, Option<DeltaRecord>, DataQuality)>,
    ) -> Self {
        rows.sort_by(|a, b| {
            b.0.tmv_score
                .total_cmp(&a.0.tmv_score)
                .then_with(|| a.0.symbol.cmp(&b.0.symbol))
        });

        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, (score, delta, data_quality))| PublishedRow {
                rank: i + 1,
                score,
                delta,
                data_quality,
            })
            .collect();

        Self { run_id, as_of, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, symbol: &str) -> Option<&PublishedRow> {
        self.rows.iter().find(|r| r.score.symbol == symbol)
    }
}

/// Last recorded failure of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureNote {
    pub at: DateTime<FixedOffset>,
    pub run_id: Uuid,
    pub reason: String,
}

/// Liveness marker for external monitoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchdogMarker {
    pub last_success_at: Option<DateTime<FixedOffset>>,
    pub last_run_id: Option<Uuid>,
    pub last_failure: Option<FailureNote>,
}

impl WatchdogMarker {
    pub fn success(&self, run_id: Uuid, at: DateTime<FixedOffset>) -> Self {
        Self {
            last_success_at: Some(at),
            last_run_id: Some(run_id),
            last_failure: self.last_failure.clone(),
        }
    }

    /// Records a failure; the last success stays as it was.
    pub fn failure(&self, run_id: Uuid, at: DateTime<FixedOffset>, reason: impl Into<String>) -> Self {
        Self {
            last_success_at: self.last_success_at,
            last_run_id: Some(run_id),
            last_failure: Some(FailureNote {
                at,
                run_id,
                reason: reason.into(),
            }),
        }
    }
}

// =============================================================================
// Run report
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Published,
    Skipped,
    EmptyResult,
    PersistenceFailed,
    WatchlistFailed,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Published => write!(f, "published"),
            Self::Skipped => write!(f, "skipped"),
            Self::EmptyResult => write!(f, "empty_result"),
            Self::PersistenceFailed => write!(f, "persistence_failed"),
            Self::WatchlistFailed => write!(f, "watchlist_failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub symbol: String,
    pub reason: String,
}

/// Summary of one scheduler invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<FixedOffset>,
    pub finished_at: DateTime<FixedOffset>,
    pub outcome: RunOutcome,
    pub published_rows: usize,
    pub excluded: Vec<Exclusion>,
}
