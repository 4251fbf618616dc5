// =============================================================================
// HttpStore — JSON documents on a remote key/value service
// =============================================================================
//
//   PUT/GET {base}/tables/live_scores
//   GET/PUT {base}/baselines/{YYYY-MM-DD}
//   PUT/GET {base}/watchdog
//
// Status mapping: 2xx ok, 404 on GET means "absent", 429 and 5xx are
// transient, any other status is fatal. Connect errors and timeouts are
// transient. The service is expected to apply each PUT atomically.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::baseline::{BaselineRecord, BaselineStore};
use crate::error::StoreError;
use crate::publisher::store::TableStore;
use crate::publisher::table::{PublishedTable, WatchdogMarker};

pub struct HttpStore {
    base_url: String,
    client: reqwest::Client,
    /// Serialises read-modify-write of a day's baselines.
    baseline_lock: Mutex<()>,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build store HTTP client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "HttpStore initialised");

        Ok(Self {
            base_url,
            client,
            baseline_lock: Mutex::new(()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    #[instrument(skip(self), name = "http_store::get")]
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, StoreError> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(status)?;

        let bytes = resp.bytes().await.map_err(transport_error)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    #[instrument(skip(self, value), name = "http_store::put")]
    async fn put_json<T: Serialize + Sync>(&self, path: &str, value: &T) -> Result<(), StoreError> {
        let resp = self
            .client
            .put(self.url(path))
            .json(value)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(resp.status())
    }
}

/// Map a response status onto the store error taxonomy.
fn check_status(status: StatusCode) -> Result<(), StoreError> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(StoreError::Transient(format!("store returned {status}")))
    } else {
        Err(StoreError::Fatal(format!("store returned {status}")))
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() || err.is_connect() {
        StoreError::Transient(err.to_string())
    } else {
        StoreError::Fatal(err.to_string())
    }
}

fn baseline_path(date: NaiveDate) -> String {
    format!("baselines/{}", date.format("%Y-%m-%d"))
}

#[async_trait]
impl TableStore for HttpStore {
    async fn replace_table(&self, table: &PublishedTable) -> Result<(), StoreError> {
        self.put_json("tables/live_scores", table).await
    }

    async fn read_table(&self) -> Result<Option<PublishedTable>, StoreError> {
        self.get_json("tables/live_scores").await
    }

    async fn write_watchdog(&self, marker: &WatchdogMarker) -> Result<(), StoreError> {
        self.put_json("watchdog", marker).await
    }

    async fn read_watchdog(&self) -> Result<WatchdogMarker, StoreError> {
        Ok(self.get_json("watchdog").await?.unwrap_or_default())
    }

    fn store_name(&self) -> &'static str {
        "http"
    }
}

#[async_trait]
impl BaselineStore for HttpStore {
    async fn load_baselines(&self, date: NaiveDate) -> Result<Vec<BaselineRecord>, StoreError> {
        Ok(self.get_json(&baseline_path(date)).await?.unwrap_or_default())
    }

    async fn insert_missing(&self, records: &[BaselineRecord]) -> Result<usize, StoreError> {
        let _guard = self.baseline_lock.lock().await;
        let mut inserted = 0;

        let mut dates: Vec<NaiveDate> = records.iter().map(|r| r.date).collect();
        dates.sort();
        dates.dedup();

        for date in dates {
            let mut day = self.load_baselines(date).await?;
            let before = day.len();
            for rec in records.iter().filter(|r| r.date == date) {
                if !day.iter().any(|b| b.symbol == rec.symbol) {
                    day.push(rec.clone());
                }
            }
            if day.len() > before {
                self.put_json(&baseline_path(date), &day).await?;
                inserted += day.len() - before;
            }
        }
        Ok(inserted)
    }
}
