//! SQLite-backed trajectory store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::{
    DownloadLease, RecordUpdate, Sensor, StoreError, StoreSummary, TrajectoryRecord,
    TrajectoryStore,
};

const SELECT_COLUMNS: &str = "SELECT trajectory_id, download_id, download_bytes, download_expires_at, is_sensor1_completed, is_sensor2_completed, is_sensor3_completed, is_sensor4_completed FROM trajectories";

/// SQLite-backed trajectory store.
///
/// Uses the `trajectories` table layout of existing `download-state.db` files.
pub struct SqliteTrajectoryStore {
    conn: Mutex<Connection>,
}

impl SqliteTrajectoryStore {
    /// Open (or create) the state database at `path`.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        // journal_mode returns the resulting mode as a row
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA synchronous=FULL;")?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS trajectories (
                trajectory_id TEXT PRIMARY KEY,

                download_id TEXT,
                download_bytes INTEGER,
                download_expires_at TEXT,

                is_sensor1_completed INTEGER DEFAULT 0,
                is_sensor2_completed INTEGER DEFAULT 0,
                is_sensor3_completed INTEGER DEFAULT 0,
                is_sensor4_completed INTEGER DEFAULT 0
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }

    fn get_with(conn: &Connection, trajectory_id: &str) -> Result<Option<TrajectoryRecord>, StoreError> {
        let sql = format!("{} WHERE trajectory_id = ?", SELECT_COLUMNS);
        let record = conn
            .query_row(&sql, params![trajectory_id], Self::row_to_record)
            .optional()?;
        Ok(record)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<TrajectoryRecord> {
        let trajectory_id: String = row.get(0)?;
        let download_id: Option<String> = row.get(1)?;
        let download_bytes: Option<i64> = row.get(2)?;
        let expires_at: Option<String> = row.get(3)?;

        let mut sensors_completed = [false; 4];
        for (i, done) in sensors_completed.iter_mut().enumerate() {
            *done = row.get::<_, Option<i64>>(4 + i)?.unwrap_or(0) != 0;
        }

        // An id without a parseable expiry is treated as already expired so
        // that the next reconciliation clears it.
        let download = download_id.map(|download_id| DownloadLease {
            download_id,
            bytes: download_bytes.and_then(|b| u64::try_from(b).ok()),
            expires_at: expires_at
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        });

        Ok(TrajectoryRecord {
            trajectory_id,
            download,
            sensors_completed,
        })
    }
}

/// Parse a stored timestamp: RFC 3339, or a naive ISO timestamp in local time.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .and_then(|naive| naive.and_local_timezone(Local).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

impl TrajectoryStore for SqliteTrajectoryStore {
    fn seed(&self, trajectory_ids: &[String]) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;

        let populated: Option<i64> = conn
            .query_row("SELECT 1 FROM trajectories LIMIT 1", [], |row| row.get(0))
            .optional()?;
        if populated.is_some() {
            return Ok(0);
        }

        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO trajectories (trajectory_id) VALUES (?)")?;
            for id in trajectory_ids {
                inserted += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;

        info!("Initialized trajectory state with {} trajectory ids", inserted);
        Ok(inserted)
    }

    fn get(&self, trajectory_id: &str) -> Result<Option<TrajectoryRecord>, StoreError> {
        let conn = self.lock()?;
        Self::get_with(&conn, trajectory_id)
    }

    fn query_uncompleted(&self) -> Result<Vec<TrajectoryRecord>, StoreError> {
        let conn = self.lock()?;

        let sql = format!(
            "{} WHERE is_sensor1_completed = 0 OR is_sensor2_completed = 0 OR is_sensor3_completed = 0 OR is_sensor4_completed = 0 ORDER BY trajectory_id",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn update(
        &self,
        trajectory_id: &str,
        update: RecordUpdate,
    ) -> Result<TrajectoryRecord, StoreError> {
        let conn = self.lock()?;

        let changed = match &update {
            RecordUpdate::Prepared(lease) => conn.execute(
                "UPDATE trajectories SET download_id = ?, download_bytes = ?, download_expires_at = ? WHERE trajectory_id = ?",
                params![
                    lease.download_id,
                    lease.bytes.and_then(|b| i64::try_from(b).ok()),
                    lease.expires_at.to_rfc3339(),
                    trajectory_id,
                ],
            )?,
            RecordUpdate::Reset => conn.execute(
                "UPDATE trajectories SET download_id = NULL, download_bytes = NULL, download_expires_at = NULL WHERE trajectory_id = ?",
                params![trajectory_id],
            )?,
            RecordUpdate::SensorCompleted(sensor) => conn.execute(
                &format!(
                    "UPDATE trajectories SET {} = 1 WHERE trajectory_id = ?",
                    sensor.column()
                ),
                params![trajectory_id],
            )?,
        };

        if changed == 0 {
            return Err(StoreError::NotFound(trajectory_id.to_string()));
        }

        Self::get_with(&conn, trajectory_id)?
            .ok_or_else(|| StoreError::NotFound(trajectory_id.to_string()))
    }

    fn count(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM trajectories", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn summary(&self) -> Result<StoreSummary, StoreError> {
        let conn = self.lock()?;

        let done = Sensor::ALL
            .iter()
            .map(|s| format!("{} = 1", s.column()))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!(
            "SELECT COUNT(*), \
             COALESCE(SUM(CASE WHEN {done} THEN 1 ELSE 0 END), 0), \
             COALESCE(SUM(CASE WHEN download_id IS NOT NULL AND NOT ({done}) THEN 1 ELSE 0 END), 0), \
             COALESCE(SUM(is_sensor1_completed), 0), COALESCE(SUM(is_sensor2_completed), 0), \
             COALESCE(SUM(is_sensor3_completed), 0), COALESCE(SUM(is_sensor4_completed), 0) \
             FROM trajectories"
        );

        let summary = conn.query_row(&sql, [], |row| {
            Ok(StoreSummary {
                total: row.get::<_, i64>(0)? as u64,
                completed: row.get::<_, i64>(1)? as u64,
                with_download: row.get::<_, i64>(2)? as u64,
                sensors_completed: [
                    row.get::<_, i64>(3)? as u64,
                    row.get::<_, i64>(4)? as u64,
                    row.get::<_, i64>(5)? as u64,
                    row.get::<_, i64>(6)? as u64,
                ],
            })
        })?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn create_test_store() -> SqliteTrajectoryStore {
        let store = SqliteTrajectoryStore::in_memory().unwrap();
        store.seed(&ids(&["16101", "16471", "17720"])).unwrap();
        store
    }

    #[test]
    fn test_seed_creates_default_records() {
        let store = create_test_store();
        assert_eq!(store.count().unwrap(), 3);

        let record = store.get("16101").unwrap().unwrap();
        assert_eq!(record, TrajectoryRecord::new("16101"));
    }

    #[test]
    fn test_seed_populated_store_is_noop() {
        let store = create_test_store();
        let lease = DownloadLease::issued_now("dl-1", Some(42), Duration::days(7));
        store
            .update("16101", RecordUpdate::Prepared(lease.clone()))
            .unwrap();

        let inserted = store.seed(&ids(&["16101", "99999"])).unwrap();
        assert_eq!(inserted, 0);
        assert_eq!(store.count().unwrap(), 3);
        assert!(store.get("99999").unwrap().is_none());
        assert_eq!(store.get("16101").unwrap().unwrap().download_id(), Some("dl-1"));
    }

    #[test]
    fn test_seed_ignores_duplicate_ids() {
        let store = SqliteTrajectoryStore::in_memory().unwrap();
        let inserted = store.seed(&ids(&["1", "1", "2"])).unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_get_nonexistent() {
        let store = create_test_store();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_prepared_and_reset_roundtrip() {
        let store = create_test_store();
        let lease = DownloadLease::issued_now("dl-1", Some(1_000), Duration::days(7));

        let updated = store
            .update("17720", RecordUpdate::Prepared(lease.clone()))
            .unwrap();
        let stored = updated.download.unwrap();
        assert_eq!(stored.download_id, "dl-1");
        assert_eq!(stored.bytes, Some(1_000));
        // RFC 3339 keeps sub-second precision
        assert_eq!(stored.expires_at, lease.expires_at);

        let reset = store.update("17720", RecordUpdate::Reset).unwrap();
        assert!(reset.download.is_none());
    }

    #[test]
    fn test_sensor_completion_is_independent() {
        let store = create_test_store();
        store
            .update("16471", RecordUpdate::SensorCompleted(Sensor::Two))
            .unwrap();
        let record = store
            .update("16471", RecordUpdate::SensorCompleted(Sensor::Four))
            .unwrap();
        assert_eq!(record.sensors_completed, [false, true, false, true]);

        // Reset never touches sensor flags
        let record = store.update("16471", RecordUpdate::Reset).unwrap();
        assert_eq!(record.sensors_completed, [false, true, false, true]);
    }

    #[test]
    fn test_query_uncompleted_excludes_done() {
        let store = create_test_store();
        for sensor in Sensor::ALL {
            store
                .update("16101", RecordUpdate::SensorCompleted(sensor))
                .unwrap();
        }

        let uncompleted = store.query_uncompleted().unwrap();
        let ids: Vec<&str> = uncompleted.iter().map(|r| r.trajectory_id.as_str()).collect();
        assert_eq!(ids, vec!["16471", "17720"]);
    }

    #[test]
    fn test_update_nonexistent() {
        let store = create_test_store();
        let result = store.update("nope", RecordUpdate::Reset);
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_summary() {
        let store = create_test_store();
        for sensor in Sensor::ALL {
            store
                .update("16101", RecordUpdate::SensorCompleted(sensor))
                .unwrap();
        }
        store
            .update("16471", RecordUpdate::SensorCompleted(Sensor::One))
            .unwrap();
        store
            .update(
                "17720",
                RecordUpdate::Prepared(DownloadLease::issued_now("dl", None, Duration::days(1))),
            )
            .unwrap();

        let summary = store.summary().unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.uncompleted(), 2);
        assert_eq!(summary.with_download, 1);
        assert_eq!(summary.sensors_completed, [2, 1, 1, 1]);
    }

    #[test]
    fn test_legacy_naive_timestamp_is_parsed() {
        let parsed = parse_timestamp("2025-10-01T12:30:00.123456").unwrap();
        let expected = NaiveDateTime::parse_from_str("2025-10-01T12:30:00.123456", "%Y-%m-%dT%H:%M:%S%.f")
            .unwrap()
            .and_local_timezone(Local)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parsed, expected);
        assert!(parse_timestamp("not a date").is_none());
    }

    #[test]
    fn test_file_based_store_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("download-state.db");

        {
            let store = SqliteTrajectoryStore::new(&db_path).unwrap();
            store.seed(&ids(&["a", "b"])).unwrap();
            store
                .update("a", RecordUpdate::SensorCompleted(Sensor::One))
                .unwrap();
        }

        let reopened = SqliteTrajectoryStore::new(&db_path).unwrap();
        assert_eq!(reopened.count().unwrap(), 2);
        assert!(reopened
            .get("a")
            .unwrap()
            .unwrap()
            .is_sensor_completed(Sensor::One));
    }
}
