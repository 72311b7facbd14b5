//! Durable SQLite-backed state shared across scans: the keyed TTL cache and
//! the append-only snapshot log.

pub mod cache;
pub mod db;
pub mod snapshot;

pub use cache::{CacheEntry, CacheStats, TtlCache};
pub use db::Db;
pub use snapshot::{SnapshotRecord, SnapshotStore};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("storage connection lock poisoned")]
    Poisoned,
}
