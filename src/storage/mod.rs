//! Storage backends for snapshot persistence
//!
//! Snapshots are append-only observations keyed by `(ticker, family)`.
//! Writes go through a [`SnapshotTransaction`] so that a failed collection
//! attempt never leaves partial data behind; collection log rows are written
//! independently of snapshot transactions.
//!
//! ## Backends
//!
//! - **SQLite**: Embedded database behind the default `storage-sqlite` feature
//! - **In-Memory**: No persistence; used when no storage section is configured
//!   or for `backend: none`

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::sync::Arc;

pub use backend::{HealthStatus, QueryRange, SnapshotTransaction, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;

use crate::config::StorageConfig;

/// Open the backend described by `config`, falling back to memory when absent.
pub async fn open(config: Option<&StorageConfig>) -> StorageResult<Arc<dyn StorageBackend>> {
    match config {
        None | Some(StorageConfig::None) => Ok(Arc::new(MemoryBackend::new())),
        #[cfg(feature = "storage-sqlite")]
        Some(StorageConfig::Sqlite { path, .. }) => {
            Ok(Arc::new(sqlite::SqliteBackend::new(path).await?))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        Some(StorageConfig::Sqlite { .. }) => Err(StorageError::InvalidConfig(
            "sqlite storage requires the storage-sqlite feature".to_string(),
        )),
    }
}
