// =============================================================================
// Store interfaces and the in-memory store
// =============================================================================
//
// A `TableStore` holds exactly one published table and the watchdog marker.
// `replace_table` must be all-or-nothing: a reader sees either the previous
// table or the new one, never a mix.
// =============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;

use crate::baseline::{BaselineRecord, BaselineStore};
use crate::error::StoreError;
use crate::publisher::table::{PublishedTable, WatchdogMarker};

#[async_trait]
pub trait TableStore: Send + Sync {
    /// Atomically replace the published table.
    async fn replace_table(&self, table: &PublishedTable) -> Result<(), StoreError>;

    /// The current table, or `None` if nothing was ever published.
    async fn read_table(&self) -> Result<Option<PublishedTable>, StoreError>;

    async fn write_watchdog(&self, marker: &WatchdogMarker) -> Result<(), StoreError>;

    /// The current marker; a default (empty) marker if none exists yet.
    async fn read_watchdog(&self) -> Result<WatchdogMarker, StoreError>;

    fn store_name(&self) -> &'static str;
}

/// Merge `records` into a per-date map, skipping (date, symbol) pairs that
/// already exist. Returns the number inserted.
pub(crate) fn merge_baselines(
    by_date: &mut BTreeMap<NaiveDate, Vec<BaselineRecord>>,
    records: &[BaselineRecord],
) -> usize {
    let mut inserted = 0;
    for rec in records {
        let day = by_date.entry(rec.date).or_default();
        if !day.iter().any(|b| b.symbol == rec.symbol) {
            day.push(rec.clone());
            inserted += 1;
        }
    }
    inserted
}

// =============================================================================
// MemoryStore
// =============================================================================

/// Process-local store. Each write swaps a whole value under the lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: RwLock<Option<PublishedTable>>,
    watchdog: RwLock<WatchdogMarker>,
    baselines: RwLock<BTreeMap<NaiveDate, Vec<BaselineRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn replace_table(&self, table: &PublishedTable) -> Result<(), StoreError> {
        *self.table.write() = Some(table.clone());
        Ok(())
    }

    async fn read_table(&self) -> Result<Option<PublishedTable>, StoreError> {
        Ok(self.table.read().clone())
    }

    async fn write_watchdog(&self, marker: &WatchdogMarker) -> Result<(), StoreError> {
        *self.watchdog.write() = marker.clone();
        Ok(())
    }

    async fn read_watchdog(&self) -> Result<WatchdogMarker, StoreError> {
        Ok(self.watchdog.read().clone())
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl BaselineStore for MemoryStore {
    async fn load_baselines(&self, date: NaiveDate) -> Result<Vec<BaselineRecord>, StoreError> {
        Ok(self.baselines.read().get(&date).cloned().unwrap_or_default())
    }

    async fn insert_missing(&self, records: &[BaselineRecord]) -> Result<usize, StoreError> {
        Ok(merge_baselines(&mut self.baselines.write(), records))
    }
}
