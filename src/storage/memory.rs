//! In-memory storage backend (no persistence)
//!
//! Used when storage is configured as `none` and throughout the tests.
//! State lives behind an `Arc<RwLock<_>>` so that transactions can hold a
//! handle to it independently of the backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, QueryRange, SnapshotTransaction, StorageBackend};
use super::error::{StorageError, StorageResult};
use crate::{CollectionLogEntry, MetricFamily, Snapshot};

type StreamKey = (String, MetricFamily);

#[derive(Debug, Default)]
struct MemoryState {
    /// Each stream is kept sorted by timestamp
    streams: HashMap<StreamKey, Vec<Snapshot>>,
    logs: Vec<CollectionLogEntry>,
}

impl MemoryState {
    fn latest_timestamp(&self, key: &StreamKey) -> Option<DateTime<Utc>> {
        self.streams
            .get(key)
            .and_then(|stream| stream.last())
            .map(|s| s.timestamp)
    }

    fn snapshot_count(&self) -> usize {
        self.streams.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot_count(&self) -> usize {
        self.state.read().snapshot_count()
    }

    /// All collection log rows, oldest first.
    pub fn logs(&self) -> Vec<CollectionLogEntry> {
        self.state.read().logs.clone()
    }

    fn in_range<'a>(
        stream: Option<&'a Vec<Snapshot>>,
        query: &'a QueryRange,
    ) -> impl Iterator<Item = &'a Snapshot> + 'a {
        stream
            .into_iter()
            .flatten()
            .filter(|s| s.timestamp >= query.start && s.timestamp <= query.end)
    }
}

pub struct MemoryTransaction {
    state: Arc<RwLock<MemoryState>>,
    pending: Vec<Snapshot>,
    finished: bool,
}

#[async_trait]
impl SnapshotTransaction for MemoryTransaction {
    async fn add_snapshot(&mut self, snapshot: Snapshot) -> StorageResult<()> {
        if self.finished {
            return Err(StorageError::TransactionClosed);
        }
        self.pending.push(snapshot);
        Ok(())
    }

    async fn commit(&mut self) -> StorageResult<usize> {
        if self.finished {
            return Err(StorageError::TransactionClosed);
        }

        let mut state = self.state.write();

        // validate the whole batch before touching any stream
        let mut latest: HashMap<StreamKey, DateTime<Utc>> = HashMap::new();
        for snapshot in &self.pending {
            let key = (snapshot.ticker.clone(), snapshot.family);
            let previous = latest
                .get(&key)
                .copied()
                .or_else(|| state.latest_timestamp(&key));
            if previous.is_some_and(|ts| snapshot.timestamp < ts) {
                return Err(StorageError::OutOfOrder {
                    ticker: snapshot.ticker.clone(),
                    family: snapshot.family.to_string(),
                });
            }
            latest.insert(key, snapshot.timestamp);
        }

        let committed = self.pending.len();
        for snapshot in self.pending.drain(..) {
            state
                .streams
                .entry((snapshot.ticker.clone(), snapshot.family))
                .or_default()
                .push(snapshot);
        }
        self.finished = true;

        debug!("committed {} snapshots to memory", committed);
        Ok(committed)
    }

    async fn rollback(&mut self) -> StorageResult<usize> {
        if self.finished {
            return Err(StorageError::TransactionClosed);
        }
        self.finished = true;
        let discarded = self.pending.len();
        self.pending.clear();
        Ok(discarded)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn begin(&self) -> StorageResult<Box<dyn SnapshotTransaction>> {
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            pending: Vec::new(),
            finished: false,
        }))
    }

    async fn query_latest(
        &self,
        ticker: &str,
        family: MetricFamily,
    ) -> StorageResult<Option<Snapshot>> {
        let state = self.state.read();
        Ok(state
            .streams
            .get(&(ticker.to_string(), family))
            .and_then(|stream| stream.last())
            .cloned())
    }

    async fn query_as_of(
        &self,
        ticker: &str,
        family: MetricFamily,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<Option<Snapshot>> {
        let state = self.state.read();
        Ok(state
            .streams
            .get(&(ticker.to_string(), family))
            .and_then(|stream| stream.iter().rev().find(|s| s.timestamp <= cutoff))
            .cloned())
    }

    async fn query_range(&self, query: QueryRange) -> StorageResult<Vec<Snapshot>> {
        let state = self.state.read();
        let stream = state.streams.get(&(query.ticker.clone(), query.family));
        Ok(Self::in_range(stream, &query)
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count_in_range(&self, query: QueryRange) -> StorageResult<usize> {
        let state = self.state.read();
        let stream = state.streams.get(&(query.ticker.clone(), query.family));
        Ok(Self::in_range(stream, &query).count())
    }

    async fn record_collection(&self, entry: CollectionLogEntry) -> StorageResult<()> {
        self.state.write().logs.push(entry);
        Ok(())
    }

    async fn query_logs_since(
        &self,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<CollectionLogEntry>> {
        let state = self.state.read();
        let mut logs: Vec<_> = state
            .logs
            .iter()
            .filter(|entry| entry.timestamp >= since)
            .cloned()
            .collect();
        logs.sort_by_key(|entry| entry.timestamp);
        Ok(logs)
    }

    async fn cleanup_old_snapshots(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut state = self.state.write();
        let mut deleted = 0;
        for stream in state.streams.values_mut() {
            let len = stream.len();
            stream.retain(|s| s.timestamp >= before);
            deleted += len - stream.len();
        }
        state.streams.retain(|_, stream| !stream.is_empty());
        Ok(deleted)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let state = self.state.read();
        Ok(HealthStatus {
            healthy: true,
            message: "in-memory backend operational".to_string(),
            snapshot_count: state.snapshot_count(),
            log_count: state.logs.len(),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
