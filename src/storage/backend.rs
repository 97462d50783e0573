//! Storage backend trait definitions

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use crate::{CollectionLogEntry, MetricFamily, Snapshot};

/// Snapshots of one stream within a time range
#[derive(Debug, Clone)]
pub struct QueryRange {
    pub ticker: String,
    pub family: MetricFamily,

    /// Start of time range (inclusive)
    pub start: DateTime<Utc>,

    /// End of time range (inclusive)
    pub end: DateTime<Utc>,

    /// Maximum number of results to return
    pub limit: Option<usize>,
}

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub message: String,
    pub snapshot_count: usize,
    pub log_count: usize,
}

/// A unit of snapshot writes that becomes visible all at once on commit.
///
/// Committing or rolling back finishes the transaction; any further call
/// returns [`StorageError::TransactionClosed`](super::StorageError::TransactionClosed).
#[async_trait]
pub trait SnapshotTransaction: Send {
    async fn add_snapshot(&mut self, snapshot: Snapshot) -> StorageResult<()>;

    /// Returns the number of snapshots committed.
    async fn commit(&mut self) -> StorageResult<usize>;

    /// Returns the number of snapshots discarded.
    async fn rollback(&mut self) -> StorageResult<usize>;
}

/// Trait for persistent storage backends
///
/// Implementations must be `Send + Sync` as they are shared across the
/// orchestrator, the comparison engine and the alert engine.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn begin(&self) -> StorageResult<Box<dyn SnapshotTransaction>>;

    /// Most recent snapshot of a stream.
    async fn query_latest(
        &self,
        ticker: &str,
        family: MetricFamily,
    ) -> StorageResult<Option<Snapshot>>;

    /// Most recent snapshot with `timestamp <= cutoff`.
    async fn query_as_of(
        &self,
        ticker: &str,
        family: MetricFamily,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<Option<Snapshot>>;

    /// Snapshots in range, oldest first.
    async fn query_range(&self, query: QueryRange) -> StorageResult<Vec<Snapshot>>;

    async fn count_in_range(&self, query: QueryRange) -> StorageResult<usize>;

    /// Append a collection log row, independent of any snapshot transaction.
    async fn record_collection(&self, entry: CollectionLogEntry) -> StorageResult<()>;

    /// Log rows with `timestamp >= since`, oldest first.
    async fn query_logs_since(&self, since: DateTime<Utc>)
    -> StorageResult<Vec<CollectionLogEntry>>;

    /// Delete snapshots older than `before`. Returns the number deleted.
    async fn cleanup_old_snapshots(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    async fn health_check(&self) -> StorageResult<HealthStatus>;

    async fn close(&self) -> StorageResult<()>;
}
