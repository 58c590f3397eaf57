//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the RecordStore
//! trait. Each source owns one database file.

use crate::extract::Record;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RecordStore, StorageError, StorageResult};
use crate::storage::{RunCounters, RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

const RUN_COLUMNS: &str = "id, source, started_at, finished_at, config_hash, status, \
     records_extracted, assets_saved, fetch_failures";

/// SQLite keyed record store
pub struct SqliteRecordStore {
    conn: Connection,
}

impl SqliteRecordStore {
    /// Opens or creates the store at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteRecordStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Rollback journal keeps the store a single file; every commit is synced
        conn.execute_batch(
            "
            PRAGMA journal_mode = DELETE;
            PRAGMA synchronous = FULL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        source: row.get(1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        config_hash: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(RunStatus::Running),
        counters: RunCounters {
            records_extracted: row.get(6)?,
            assets_saved: row.get(7)?,
            fetch_failures: row.get(8)?,
        },
    })
}

impl RecordStore for SqliteRecordStore {
    // ===== Run Management =====

    fn create_run(&mut self, source: &str, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (source, started_at, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![source, now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let sql = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT ?1", RUN_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;

        let runs = stmt
            .query_map(params![limit as i64], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(runs)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        counters: &RunCounters,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, records_extracted = ?3,
             assets_saved = ?4, fetch_failures = ?5 WHERE id = ?6",
            params![
                status.to_db_string(),
                now,
                counters.records_extracted,
                counters.assets_saved,
                counters.fetch_failures,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Record Management =====

    fn upsert(&mut self, record: &Record, run_id: i64) -> StorageResult<()> {
        let data = serde_json::to_string(record)?;
        let now = Utc::now().to_rfc3339();

        // Whole-record replacement; first_seen_run survives the conflict
        self.conn.execute(
            "INSERT INTO records (url, data, first_seen_run, updated_run, updated_at)
             VALUES (?1, ?2, ?3, ?3, ?4)
             ON CONFLICT(url) DO UPDATE SET
                data = excluded.data,
                updated_run = excluded.updated_run,
                updated_at = excluded.updated_at",
            params![record.url(), data, run_id, now],
        )?;
        Ok(())
    }

    fn get(&self, url: &str) -> StorageResult<Option<Record>> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM records WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
