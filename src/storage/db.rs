use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::{debug, info};

use super::StorageError;

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 3000;

CREATE TABLE IF NOT EXISTS cache (
    key TEXT PRIMARY KEY,
    value_json TEXT NOT NULL,
    fetched_at INTEGER NOT NULL,
    ttl_seconds INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshots (
    snapshot_id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at INTEGER NOT NULL,
    snapshot_type TEXT NOT NULL,
    country TEXT NOT NULL,
    params_json TEXT NOT NULL,
    rows_json TEXT NOT NULL
);
"#;

/// Shared handle to the radar's SQLite file.
///
/// A single connection guarded by a mutex: scans are sequential, so the lock
/// is only ever contended by the CLI's own maintenance commands.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        info!(path=%path.display(), "radar db opened");
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        debug!("radar db opened in memory");
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` against the connection. Each call is one short critical section.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let guard = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        f(&guard)
    }
}

fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, table: &str) -> Result<bool, StorageError> {
        let mut stmt = conn.prepare(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND lower(name) = lower(?) LIMIT 1",
        )?;
        let mut rows = stmt.query([table])?;
        Ok(rows.next()?.is_some())
    }

    #[test]
    fn schema_is_created() {
        let db = Db::open_in_memory().unwrap();
        let (cache, snapshots) = db
            .with_conn(|c| Ok((table_exists(c, "cache")?, table_exists(c, "snapshots")?)))
            .unwrap();
        assert!(cache);
        assert!(snapshots);
    }
}
