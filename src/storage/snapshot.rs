use chrono::{DateTime, TimeZone, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Db, StorageError};

/// One persisted scan output, kept for later inspection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotRecord {
    pub snapshot_id: i64,
    pub created_at: DateTime<Utc>,
    pub snapshot_type: String,
    pub country: String,
    pub params: Value,
    pub rows: Value,
}

pub struct SnapshotStore {
    db: Db,
}

impl SnapshotStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn save<P, R>(
        &self,
        created_at: DateTime<Utc>,
        snapshot_type: &str,
        country: &str,
        params: &P,
        rows: &[R],
    ) -> Result<i64, StorageError>
    where
        P: Serialize,
        R: Serialize,
    {
        let params_json = serde_json::to_string(params)?;
        let rows_json = serde_json::to_string(rows)?;
        self.db.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO snapshots (created_at, snapshot_type, country, params_json, rows_json)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    created_at.timestamp(),
                    snapshot_type,
                    country,
                    params_json,
                    rows_json
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Most recent snapshots first.
    pub fn recent(&self, limit: usize) -> Result<Vec<SnapshotRecord>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT snapshot_id, created_at, snapshot_type, country, params_json, rows_json
                FROM snapshots
                ORDER BY snapshot_id DESC
                LIMIT ?1
                "#,
            )?;
            let raw = stmt.query_map(params![limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?;

            let mut out = Vec::new();
            for item in raw {
                let (snapshot_id, created_at, snapshot_type, country, params_json, rows_json) = item?;
                out.push(SnapshotRecord {
                    snapshot_id,
                    created_at: Utc
                        .timestamp_opt(created_at, 0)
                        .single()
                        .unwrap_or(DateTime::<Utc>::MIN_UTC),
                    snapshot_type,
                    country,
                    params: serde_json::from_str(&params_json)?,
                    rows: serde_json::from_str(&rows_json)?,
                });
            }
            Ok(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn appends_and_lists_newest_first() {
        let store = SnapshotStore::new(Db::open_in_memory().unwrap());
        let t0 = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        store
            .save(t0, "new", "US", &json!({"window_days": 14}), &[json!({"appid": 1})])
            .unwrap();
        store
            .save(t0, "upcoming", "US, DE", &json!({"window_days": 60}), &Vec::<Value>::new())
            .unwrap();

        let recent = store.recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].snapshot_type, "upcoming");
        assert_eq!(recent[1].rows, json!([{"appid": 1}]));
        assert_eq!(recent[1].created_at, t0);
    }
}
