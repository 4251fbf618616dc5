// =============================================================================
// Shared state for the display API
// =============================================================================
//
// The API never writes. It reads the published table and watchdog marker
// from the same store the scheduler publishes to, and tags the table with the
// freshness classifier so old numbers are never shown as current.
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset};

use crate::error::StoreError;
use crate::freshness::{self, FreshnessPolicy};
use crate::publisher::{PublishedTable, TableStore, WatchdogMarker};
use crate::scheduler::Clock;
use crate::types::DataQuality;

pub struct AppState {
    pub store: Arc<dyn TableStore>,
    pub freshness: FreshnessPolicy,
    pub clock: Arc<dyn Clock>,
}

/// The published table as seen at `now`.
#[derive(Debug, Clone)]
pub struct TableView {
    pub now: DateTime<FixedOffset>,
    pub table: Option<PublishedTable>,
    pub publish_age_secs: Option<i64>,
    pub data_quality: DataQuality,
    /// Age past which the table stops being OK.
    pub exceeded_ceiling: Option<Duration>,
}

impl TableView {
    /// Human-readable warning when the table should not be read as current.
    pub fn warning(&self) -> Option<String> {
        match (&self.table, self.data_quality) {
            (None, _) => Some("no table has been published yet".to_string()),
            (Some(_), DataQuality::Ok) => None,
            (Some(t), quality) => Some(format!(
                "published table is {quality}: last publish at {} ({}s ago, limit {}s)",
                t.as_of.to_rfc3339(),
                self.publish_age_secs.unwrap_or_default(),
                self.exceeded_ceiling.map(|d| d.num_seconds()).unwrap_or_default()
            )),
        }
    }
}

impl AppState {
    pub fn new(store: Arc<dyn TableStore>, freshness: FreshnessPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            freshness,
            clock,
        }
    }

    pub async fn table_view(&self) -> Result<TableView, StoreError> {
        let now = self.clock.now();
        let table = self.store.read_table().await?;
        let as_of = table.as_ref().map(|t| t.as_of);
        let data_quality = self.freshness.classify(as_of, now);
        let exceeded_ceiling = match data_quality {
            DataQuality::Ok => None,
            DataQuality::Stale => Some(self.freshness.ok_ceiling()),
            DataQuality::Unknown => as_of.map(|_| self.freshness.stale_ceiling()),
        };

        Ok(TableView {
            now,
            publish_age_secs: as_of.map(|ts| freshness::age(ts, now).num_seconds()),
            data_quality,
            exceeded_ceiling,
            table,
        })
    }

    pub async fn watchdog(&self) -> Result<WatchdogMarker, StoreError> {
        self.store.read_watchdog().await
    }
}
