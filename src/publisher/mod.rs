// =============================================================================
// Publisher — all-or-nothing table replacement with bounded retry
// =============================================================================
//
// 1. `replace_table` is retried on transient errors with exponential backoff.
//    Each attempt has its own timeout; an elapsed timeout counts as transient.
// 2. On exhaustion (or a fatal error) nothing is written and the previously
//    published table stays visible.
// 3. After a successful replace the watchdog marker is updated separately.
//    A watchdog write failure is logged but does not undo the publish.
// =============================================================================

pub mod file_store;
pub mod http_store;
pub mod retry;
pub mod store;
pub mod table;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{PublishError, StoreError};

pub use file_store::FileStore;
pub use http_store::HttpStore;
pub use retry::{with_retry, RetryPolicy, Sleeper, TokioSleeper};
pub use store::{MemoryStore, TableStore};
pub use table::{Exclusion, PublishedRow, PublishedTable, RunOutcome, RunReport, WatchdogMarker};

pub struct Publisher {
    store: Arc<dyn TableStore>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    call_timeout: Duration,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn TableStore>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            policy,
            sleeper,
            call_timeout,
        }
    }

    /// Replace the published table, then mark the run as the last success.
    pub async fn publish(&self, table: &PublishedTable, now: DateTime<FixedOffset>) -> Result<(), PublishError> {
        let outcome = with_retry(&self.policy, self.sleeper.as_ref(), "replace_table", || {
            timed(self.call_timeout, self.store.replace_table(table))
        })
        .await;

        if let Err(exhausted) = outcome {
            error!(
                run_id = %table.run_id,
                attempts = exhausted.attempts,
                error = %exhausted.last_error,
                store = self.store.store_name(),
                "publish failed; previous table left in place"
            );
            return Err(PublishError::PersistenceFatal {
                attempts: exhausted.attempts,
                last_error: exhausted.last_error,
            });
        }

        info!(
            run_id = %table.run_id,
            rows = table.len(),
            store = self.store.store_name(),
            "table published"
        );

        self.update_watchdog(|m| m.success(table.run_id, now)).await;
        Ok(())
    }

    /// Record a failed run on the watchdog marker. Best effort.
    pub async fn record_failure(&self, run_id: Uuid, now: DateTime<FixedOffset>, reason: &str) {
        self.update_watchdog(|m| m.failure(run_id, now, reason)).await;
    }

    async fn update_watchdog(&self, f: impl Fn(&WatchdogMarker) -> WatchdogMarker) {
        let current = match timed(self.call_timeout, self.store.read_watchdog()).await {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "could not read watchdog marker, starting fresh");
                WatchdogMarker::default()
            }
        };
        let next = f(&current);

        let written = with_retry(&self.policy, self.sleeper.as_ref(), "write_watchdog", || {
            timed(self.call_timeout, self.store.write_watchdog(&next))
        })
        .await;

        if let Err(e) = written {
            warn!(attempts = e.attempts, error = %e.last_error, "watchdog marker not written");
        }
    }
}

/// Bound a store call; an elapsed timeout is a transient failure.
async fn timed<T>(limit: Duration, call: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Transient(format!("store call timed out after {limit:?}"))),
    }
}


#[cfg(test)]
mod tests {
    use super::retry::RecordingSleeper;
    use super::testing::FlakyStore;
    use super::*;
    use crate::market_data::fixtures::{score_record, session_start};
    use crate::types::DataQuality;

    fn table(symbols: &[(&str, f64)]) -> PublishedTable {
        let at = session_start();
        PublishedTable::assemble(
            Uuid::new_v4(),
            at,
            symbols
                .iter()
                .map(|(s, tmv)| (score_record(s, *tmv, at), None, DataQuality::Ok))
                .collect(),
        )
    }

    fn publisher(store: Arc<FlakyStore>, sleeper: Arc<RecordingSleeper>) -> Publisher {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            jitter: false,
        };
        Publisher::new(store, policy, sleeper, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn publish_retries_transient_then_succeeds() {
        let store = Arc::new(FlakyStore::failing([
            StoreError::Transient("429".into()),
            StoreError::Transient("503".into()),
        ]));
        let sleeper = Arc::new(RecordingSleeper::default());
        let p = publisher(store.clone(), sleeper.clone());

        let t = table(&[("INFY", 6.0)]);
        p.publish(&t, session_start()).await.unwrap();

        assert_eq!(*store.replace_calls.lock(), 3);
        assert_eq!(store.read_table().await.unwrap(), Some(t.clone()));
        assert_eq!(sleeper.slept.lock().len(), 2);

        let marker = store.read_watchdog().await.unwrap();
        assert_eq!(marker.last_run_id, Some(t.run_id));
        assert_eq!(marker.last_success_at, Some(session_start()));
    }

    #[tokio::test]
    async fn exhausted_retries_leave_previous_table() {
        let store = Arc::new(FlakyStore::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let p = publisher(store.clone(), sleeper.clone());

        let old = table(&[("INFY", 6.0), ("TCS", 4.0)]);
        p.publish(&old, session_start()).await.unwrap();
        let marker_before = store.read_watchdog().await.unwrap();

        store
            .replace_errors
            .lock()
            .extend((0..3).map(|_| StoreError::Transient("503".into())));
        let new = table(&[("INFY", 9.0)]);
        let err = p.publish(&new, session_start()).await.unwrap_err();

        assert!(matches!(err, PublishError::PersistenceFatal { attempts: 3, .. }));
        assert_eq!(store.read_table().await.unwrap(), Some(old));
        assert_eq!(store.read_watchdog().await.unwrap(), marker_before);
    }

    #[tokio::test]
    async fn fatal_error_aborts_immediately() {
        let store = Arc::new(FlakyStore::failing([StoreError::Fatal("403".into())]));
        let sleeper = Arc::new(RecordingSleeper::default());
        let p = publisher(store.clone(), sleeper.clone());

        let err = p.publish(&table(&[("INFY", 6.0)]), session_start()).await.unwrap_err();
        assert!(matches!(err, PublishError::PersistenceFatal { attempts: 1, .. }));
        assert!(sleeper.slept.lock().is_empty());
        assert!(store.read_table().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failure_note_preserves_last_success() {
        let store = Arc::new(FlakyStore::default());
        let p = publisher(store.clone(), Arc::new(RecordingSleeper::default()));
        let t = table(&[("INFY", 6.0)]);
        p.publish(&t, session_start()).await.unwrap();

        let failed_run = Uuid::new_v4();
        let later = session_start() + chrono::Duration::minutes(5);
        p.record_failure(failed_run, later, "empty result").await;

        let marker = store.read_watchdog().await.unwrap();
        assert_eq!(marker.last_success_at, Some(session_start()));
        let note = marker.last_failure.unwrap();
        assert_eq!(note.run_id, failed_run);
        assert_eq!(note.reason, "empty result");
    }
}
