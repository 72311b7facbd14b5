//! Keyed TTL cache over the `cache` table.
//!
//! Entries are valid while `now <= fetched_at + ttl`. An expired row is
//! indistinguishable from a missing one and is deleted on the read that
//! notices it. Writes are plain upserts: last write wins, fetch time resets.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Db, StorageError};
use crate::clock::Clock;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub fetched_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn expires_at(&self) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        self.fetched_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: u64,
    pub expired: u64,
}

pub struct TtlCache {
    db: Db,
    clock: Arc<dyn Clock>,
}

impl TtlCache {
    pub fn new(db: Db, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn get(&self, key: &str) -> Result<Option<CacheEntry>, StorageError> {
        let now = self.clock.now();
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT value_json, fetched_at, ttl_seconds FROM cache WHERE key = ?1",
                    params![key],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    },
                )
                .optional()?;
            let Some((value_json, fetched_at, ttl_seconds)) = row else {
                return Ok(None);
            };

            let entry = CacheEntry {
                key: key.to_string(),
                value: serde_json::from_str(&value_json)?,
                fetched_at: Utc
                    .timestamp_opt(fetched_at, 0)
                    .single()
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
                ttl: Duration::from_secs(ttl_seconds.max(0) as u64),
            };
            if entry.is_valid_at(now) {
                return Ok(Some(entry));
            }

            // Only drop the stale version we just read; a concurrent refresh wins.
            let removed = conn.execute(
                "DELETE FROM cache WHERE key = ?1 AND fetched_at = ?2",
                params![key, fetched_at],
            )?;
            debug!(key, removed, "cache entry expired");
            Ok(None)
        })
    }

    pub fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), StorageError> {
        let value_json = serde_json::to_string(value)?;
        let fetched_at = self.clock.now().timestamp();
        let ttl_seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        self.db.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO cache (key, value_json, fetched_at, ttl_seconds)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(key) DO UPDATE SET
                    value_json = excluded.value_json,
                    fetched_at = excluded.fetched_at,
                    ttl_seconds = excluded.ttl_seconds
                "#,
                params![key, value_json, fetched_at, ttl_seconds],
            )?;
            Ok(())
        })
    }

    /// Typed read. A payload that no longer deserializes into `T` counts as a miss.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let Some(entry) = self.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_value::<T>(entry.value) {
            Ok(v) => Ok(Some(v)),
            Err(err) => {
                warn!(key, error=%err, "cached payload has unexpected shape; treating as miss");
                Ok(None)
            }
        }
    }

    pub fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        let value = serde_json::to_value(value)?;
        self.set(key, &value, ttl)
    }

    /// Delete every expired row; returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, StorageError> {
        let now = self.clock.now().timestamp();
        self.db.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM cache WHERE fetched_at + ttl_seconds < ?1",
                params![now],
            )?;
            Ok(removed)
        })
    }

    pub fn stats(&self) -> Result<CacheStats, StorageError> {
        let now = self.clock.now().timestamp();
        self.db.with_conn(|conn| {
            let (entries, expired) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(CASE WHEN fetched_at + ttl_seconds < ?1 THEN 1 ELSE 0 END), 0) FROM cache",
                params![now],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )?;
            Ok(CacheStats {
                entries: entries.max(0) as u64,
                expired: expired.max(0) as u64,
            })
        })
    }
}
