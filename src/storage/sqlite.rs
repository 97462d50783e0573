//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers are not blocked by the collector's writes
//! - **Migrations**: Schema versioning with `sqlx::migrate!`
//!
//! Timestamps are stored as Unix milliseconds; field maps and raw payloads
//! as JSON text.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite, Transaction};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, QueryRange, SnapshotTransaction, StorageBackend};
use super::error::{StorageError, StorageResult};
use crate::{CollectionLogEntry, FieldMap, MetricFamily, Snapshot};

pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Open (creating if needed) the database at `db_path` and run migrations.
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> StorageResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            StorageError::SerializationError(format!("timestamp out of range: {millis}"))
        })
    }

    fn parse_family(family: &str) -> StorageResult<MetricFamily> {
        family.parse().map_err(StorageError::SerializationError)
    }

    fn row_to_snapshot(row: &SqliteRow) -> StorageResult<Snapshot> {
        let fields: String = row.try_get("fields")?;
        let raw_payload: String = row.try_get("raw_payload")?;
        let family: String = row.try_get("family")?;

        Ok(Snapshot {
            ticker: row.try_get("ticker")?,
            family: Self::parse_family(&family)?,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?)?,
            fields: serde_json::from_str::<FieldMap>(&fields)?,
            raw_payload: serde_json::from_str(&raw_payload)?,
        })
    }

    fn row_to_log(row: &SqliteRow) -> StorageResult<CollectionLogEntry> {
        let family: String = row.try_get("family")?;

        Ok(CollectionLogEntry {
            ticker: row.try_get("ticker")?,
            family: Self::parse_family(&family)?,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?)?,
            success: row.try_get("success")?,
            error_message: row.try_get("error_message")?,
            duration_seconds: row.try_get("duration_seconds")?,
            records_collected: row.try_get::<i64, _>("records_collected")?.max(0) as usize,
            source: row.try_get("source")?,
            endpoint: row.try_get("endpoint")?,
        })
    }
}

pub struct SqliteTransaction {
    tx: Option<Transaction<'static, Sqlite>>,
    pending: usize,
}

#[async_trait]
impl SnapshotTransaction for SqliteTransaction {
    async fn add_snapshot(&mut self, snapshot: Snapshot) -> StorageResult<()> {
        let tx = self.tx.as_mut().ok_or(StorageError::TransactionClosed)?;
        let timestamp = SqliteBackend::timestamp_to_millis(&snapshot.timestamp);
        let family = snapshot.family.as_str();

        let (latest,): (Option<i64>,) = sqlx::query_as(
            "SELECT MAX(timestamp) FROM snapshots WHERE ticker = ? AND family = ?",
        )
        .bind(&snapshot.ticker)
        .bind(family)
        .fetch_one(&mut **tx)
        .await?;

        if latest.is_some_and(|latest| timestamp < latest) {
            return Err(StorageError::OutOfOrder {
                ticker: snapshot.ticker,
                family: family.to_string(),
            });
        }

        let fields = serde_json::to_string(&snapshot.fields)?;
        let raw_payload = serde_json::to_string(&snapshot.raw_payload)?;

        sqlx::query(
            r#"
            INSERT INTO snapshots (ticker, family, timestamp, fields, raw_payload)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&snapshot.ticker)
        .bind(family)
        .bind(timestamp)
        .bind(fields)
        .bind(raw_payload)
        .execute(&mut **tx)
        .await?;

        self.pending += 1;
        Ok(())
    }

    async fn commit(&mut self) -> StorageResult<usize> {
        let tx = self.tx.take().ok_or(StorageError::TransactionClosed)?;
        tx.commit().await?;
        Ok(std::mem::take(&mut self.pending))
    }

    async fn rollback(&mut self) -> StorageResult<usize> {
        let tx = self.tx.take().ok_or(StorageError::TransactionClosed)?;
        tx.rollback().await?;
        Ok(std::mem::take(&mut self.pending))
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn begin(&self) -> StorageResult<Box<dyn SnapshotTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTransaction {
            tx: Some(tx),
            pending: 0,
        }))
    }

    #[instrument(skip(self))]
    async fn query_latest(
        &self,
        ticker: &str,
        family: MetricFamily,
    ) -> StorageResult<Option<Snapshot>> {
        let row = sqlx::query(
            r#"
            SELECT ticker, family, timestamp, fields, raw_payload
            FROM snapshots
            WHERE ticker = ? AND family = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(ticker)
        .bind(family.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_snapshot).transpose()
    }

    #[instrument(skip(self))]
    async fn query_as_of(
        &self,
        ticker: &str,
        family: MetricFamily,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<Option<Snapshot>> {
        let row = sqlx::query(
            r#"
            SELECT ticker, family, timestamp, fields, raw_payload
            FROM snapshots
            WHERE ticker = ? AND family = ? AND timestamp <= ?
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(ticker)
        .bind(family.as_str())
        .bind(Self::timestamp_to_millis(&cutoff))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_snapshot).transpose()
    }

    #[instrument(skip(self), fields(ticker = %query.ticker, family = %query.family))]
    async fn query_range(&self, query: QueryRange) -> StorageResult<Vec<Snapshot>> {
        let limit = query
            .limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(-1);

        let rows = sqlx::query(
            r#"
            SELECT ticker, family, timestamp, fields, raw_payload
            FROM snapshots
            WHERE ticker = ? AND family = ? AND timestamp >= ? AND timestamp <= ?
            ORDER BY timestamp ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(&query.ticker)
        .bind(query.family.as_str())
        .bind(Self::timestamp_to_millis(&query.start))
        .bind(Self::timestamp_to_millis(&query.end))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let snapshots = rows
            .iter()
            .map(Self::row_to_snapshot)
            .collect::<StorageResult<Vec<_>>>()?;
        debug!("query returned {} snapshots", snapshots.len());
        Ok(snapshots)
    }

    async fn count_in_range(&self, query: QueryRange) -> StorageResult<usize> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM snapshots
            WHERE ticker = ? AND family = ? AND timestamp >= ? AND timestamp <= ?
            "#,
        )
        .bind(&query.ticker)
        .bind(query.family.as_str())
        .bind(Self::timestamp_to_millis(&query.start))
        .bind(Self::timestamp_to_millis(&query.end))
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as usize)
    }

    async fn record_collection(&self, entry: CollectionLogEntry) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO collection_logs (
                ticker, family, timestamp, success, error_message,
                duration_seconds, records_collected, source, endpoint
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.ticker)
        .bind(entry.family.as_str())
        .bind(Self::timestamp_to_millis(&entry.timestamp))
        .bind(entry.success)
        .bind(&entry.error_message)
        .bind(entry.duration_seconds)
        .bind(i64::try_from(entry.records_collected).unwrap_or(i64::MAX))
        .bind(&entry.source)
        .bind(&entry.endpoint)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query_logs_since(
        &self,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<CollectionLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT ticker, family, timestamp, success, error_message,
                   duration_seconds, records_collected, source, endpoint
            FROM collection_logs
            WHERE timestamp >= ?
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(Self::timestamp_to_millis(&since))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_log).collect()
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_old_snapshots(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        info!("cleaning up snapshots older than {}", before);

        let result = sqlx::query("DELETE FROM snapshots WHERE timestamp < ?")
            .bind(Self::timestamp_to_millis(&before))
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        info!("deleted {} old snapshots", deleted);
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let counts: Result<(i64, i64), sqlx::Error> = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM snapshots), (SELECT COUNT(*) FROM collection_logs)",
        )
        .fetch_one(&self.pool)
        .await;

        match counts {
            Ok((snapshots, logs)) => Ok(HealthStatus {
                healthy: true,
                message: format!("SQLite backend operational ({})", self.db_path),
                snapshot_count: snapshots.max(0) as usize,
                log_count: logs.max(0) as usize,
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    snapshot_count: 0,
                    log_count: 0,
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
