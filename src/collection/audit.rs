use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tracing::{error, info, instrument, warn};

use super::{CollectError, FamilyResult};
use crate::storage::{SnapshotTransaction, StorageBackend, StorageError, StorageResult};
use crate::util::normalize_ticker;
use crate::{CollectionLogEntry, MetricFamily, Snapshot};

/// Runs collection operations and writes exactly one log row per attempt.
///
/// The wrapped operation produces snapshots; they are persisted inside a
/// single transaction which is rolled back if any write fails. Errors and
/// panics are converted into a failed [`FamilyResult`].
#[derive(Clone)]
pub struct CollectionAudit {
    store: Arc<dyn StorageBackend>,
}

impl CollectionAudit {
    pub fn new(store: Arc<dyn StorageBackend>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, operation), fields(family = %family))]
    pub async fn run<F, Fut>(
        &self,
        ticker: &str,
        family: MetricFamily,
        operation: F,
    ) -> FamilyResult
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Vec<Snapshot>, CollectError>>,
    {
        let ticker = normalize_ticker(ticker);
        let started = Instant::now();

        let outcome = match AssertUnwindSafe(operation(ticker.clone()))
            .catch_unwind()
            .await
        {
            Ok(Ok(snapshots)) => self.persist(snapshots).await,
            Ok(Err(err)) => Err(err),
            Err(panic) => Err(CollectError::Panicked(panic_message(panic.as_ref()))),
        };

        match outcome {
            Ok(records) => {
                info!("collected {family} for {ticker} ({records} records)");
                self.record(&ticker, family, None, started.elapsed(), records)
                    .await;
                FamilyResult::success(records)
            }
            Err(err) => {
                match &err {
                    CollectError::NoData(cause) => {
                        error!("error collecting {family} for {ticker}: {cause}")
                    }
                    other => error!("error collecting {family} for {ticker}: {other}"),
                }
                let message = err.to_string();
                self.record(
                    &ticker,
                    family,
                    Some(message.clone()),
                    started.elapsed(),
                    0,
                )
                .await;
                FamilyResult::error(message)
            }
        }
    }

    /// Log a failure that happened before any operation could run.
    pub async fn record_failure(
        &self,
        ticker: &str,
        family: MetricFamily,
        message: &str,
        elapsed: Duration,
    ) -> FamilyResult {
        let ticker = normalize_ticker(ticker);
        error!("error collecting {family} for {ticker}: {message}");
        self.record(&ticker, family, Some(message.to_string()), elapsed, 0)
            .await;
        FamilyResult::error(message)
    }

    async fn persist(&self, snapshots: Vec<Snapshot>) -> Result<usize, CollectError> {
        let mut tx = self.store.begin().await?;

        for snapshot in snapshots {
            if let Err(err) = tx.add_snapshot(snapshot).await {
                if let Err(rollback_err) = tx.rollback().await {
                    error!("rollback failed: {rollback_err}");
                }
                return Err(err.into());
            }
        }

        match tx.commit().await {
            Ok(committed) => Ok(committed),
            Err(err) => {
                if let Err(rollback_err) = finish_rollback(tx.as_mut()).await {
                    warn!("rollback after failed commit failed: {rollback_err}");
                }
                Err(err.into())
            }
        }
    }

    async fn record(
        &self,
        ticker: &str,
        family: MetricFamily,
        error_message: Option<String>,
        elapsed: Duration,
        records: usize,
    ) {
        let endpoint = family.endpoint();
        let entry = CollectionLogEntry {
            ticker: ticker.to_string(),
            family,
            timestamp: Utc::now(),
            success: error_message.is_none(),
            error_message,
            duration_seconds: elapsed.as_secs_f64(),
            records_collected: records,
            source: endpoint.provider.source().to_string(),
            endpoint: endpoint.path.to_string(),
        };

        if let Err(err) = self.store.record_collection(entry).await {
            error!("failed to log collection for {ticker} {family}: {err}");
        }
    }
}

/// Roll back, treating a transaction the failed commit already closed as done.
async fn finish_rollback(tx: &mut dyn SnapshotTransaction) -> StorageResult<usize> {
    match tx.rollback().await {
        Err(StorageError::TransactionClosed) => Ok(0),
        other => other,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
