//! Storage module for persisting harvest results
//!
//! Every source owns a directory `<data-dir>/<source>/` holding:
//! - `<source>.jsonl`, the append-only record log
//! - `<source>.db`, the keyed store with one row per record url plus run history
//! - downloaded assets and page dumps

mod assets;
mod jsonl;
mod schema;
mod sqlite;
mod traits;

pub use assets::AssetSink;
pub use jsonl::{read_records, JsonLinesLog};
pub use sqlite::SqliteRecordStore;
pub use traits::{RecordStore, StorageError, StorageResult};

use crate::extract::Record;
use std::fs;
use std::path::{Path, PathBuf};

/// Path of a source's record log
pub fn log_path(source_dir: &Path, source: &str) -> PathBuf {
    source_dir.join(format!("{}.jsonl", source))
}

/// Path of a source's keyed store
pub fn store_path(source_dir: &Path, source: &str) -> PathBuf {
    source_dir.join(format!("{}.db", source))
}

/// Opens the keyed store of a source, creating its directory if needed
pub fn open_store(source_dir: &Path, source: &str) -> StorageResult<SqliteRecordStore> {
    fs::create_dir_all(source_dir)?;
    SqliteRecordStore::open(&store_path(source_dir, source))
}

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub source: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub counters: RunCounters,
}

/// Per-run totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub records_extracted: u64,
    pub assets_saved: u64,
    pub fetch_failures: u64,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Record sink: the log and the keyed store of one source, fed together
///
/// Each record is appended to the log first and then upserted into the
/// store. Either failure is returned to the caller.
pub struct RecordSink {
    log: JsonLinesLog,
    store: SqliteRecordStore,
    run_id: i64,
}

impl RecordSink {
    /// Opens the log of `source` next to an already opened store
    ///
    /// # Arguments
    ///
    /// * `source_dir` - The source's output directory
    /// * `source` - Source name, used for file names
    /// * `store` - The source's keyed store
    /// * `run_id` - Run that the upserts are attributed to
    pub fn open(
        source_dir: &Path,
        source: &str,
        store: SqliteRecordStore,
        run_id: i64,
    ) -> StorageResult<Self> {
        fs::create_dir_all(source_dir)?;
        let log = JsonLinesLog::open(&log_path(source_dir, source))?;
        Ok(Self { log, store, run_id })
    }

    /// Persists one record to both outputs
    pub fn persist(&mut self, record: &Record) -> StorageResult<()> {
        self.log.append(record)?;
        self.store.upsert(record, self.run_id)?;
        Ok(())
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn store(&self) -> &SqliteRecordStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SqliteRecordStore {
        &mut self.store
    }
}
