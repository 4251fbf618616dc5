// =============================================================================
// FileStore — JSON documents in a directory, atomic replace
// =============================================================================
//
//   <dir>/live_scores.json   published table
//   <dir>/baselines.json     { "YYYY-MM-DD": [BaselineRecord, ...], ... }
//   <dir>/watchdog.json      watchdog marker
//
// Every write goes to `<name>.tmp` first and is renamed over the target, so a
// reader never sees a half-written document.
// =============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::baseline::{BaselineRecord, BaselineStore};
use crate::error::StoreError;
use crate::publisher::store::{merge_baselines, TableStore};
use crate::publisher::table::{PublishedTable, WatchdogMarker};

const TABLE_FILE: &str = "live_scores.json";
const BASELINE_FILE: &str = "baselines.json";
const WATCHDOG_FILE: &str = "watchdog.json";

/// Baseline dates kept on disk.
const BASELINE_RETENTION_DAYS: usize = 30;

pub struct FileStore {
    dir: PathBuf,
    /// Serialises read-modify-write of the baseline file.
    baseline_lock: Mutex<()>,
}

impl FileStore {
    /// Create the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            baseline_lock: Mutex::new(()),
        })
    }

    async fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StoreError> {
        let path = self.dir.join(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_json<T: Serialize + Sync>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{name}.tmp"));
        let body = serde_json::to_vec_pretty(value)?;

        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), bytes = body.len(), "file store write (atomic)");
        Ok(())
    }
}

#[async_trait]
impl TableStore for FileStore {
    async fn replace_table(&self, table: &PublishedTable) -> Result<(), StoreError> {
        self.write_json(TABLE_FILE, table).await
    }

    async fn read_table(&self) -> Result<Option<PublishedTable>, StoreError> {
        self.read_json(TABLE_FILE).await
    }

    async fn write_watchdog(&self, marker: &WatchdogMarker) -> Result<(), StoreError> {
        self.write_json(WATCHDOG_FILE, marker).await
    }

    async fn read_watchdog(&self) -> Result<WatchdogMarker, StoreError> {
        Ok(self.read_json(WATCHDOG_FILE).await?.unwrap_or_default())
    }

    fn store_name(&self) -> &'static str {
        "file"
    }
}

#[async_trait]
impl BaselineStore for FileStore {
    async fn load_baselines(&self, date: NaiveDate) -> Result<Vec<BaselineRecord>, StoreError> {
        let all: BTreeMap<NaiveDate, Vec<BaselineRecord>> =
            self.read_json(BASELINE_FILE).await?.unwrap_or_default();
        Ok(all.get(&date).cloned().unwrap_or_default())
    }

    async fn insert_missing(&self, records: &[BaselineRecord]) -> Result<usize, StoreError> {
        let _guard = self.baseline_lock.lock().await;

        let mut all: BTreeMap<NaiveDate, Vec<BaselineRecord>> =
            self.read_json(BASELINE_FILE).await?.unwrap_or_default();
        let inserted = merge_baselines(&mut all, records);
        if inserted == 0 {
            return Ok(0);
        }

        while all.len() > BASELINE_RETENTION_DAYS {
            all.pop_first();
        }
        self.write_json(BASELINE_FILE, &all).await?;
        Ok(inserted)
    }
}
