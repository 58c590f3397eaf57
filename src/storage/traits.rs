//! Storage traits and error types
//!
//! This module defines the trait interface for keyed record stores and
//! associated error types.

use crate::extract::Record;
use crate::storage::{RunCounters, RunRecord, RunStatus};
use crate::UrlError;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Asset name error: {0}")]
    AssetName(#[from] UrlError),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for keyed record store backends
///
/// A store holds exactly one row per record `url` and a history of the
/// runs that wrote to it.
pub trait RecordStore {
    // ===== Run Management =====

    /// Creates a new run for `source` in the `running` state
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, source: &str, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent runs, newest first
    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>>;

    /// Records a run's final status, counters and finish timestamp
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        counters: &RunCounters,
    ) -> StorageResult<()>;

    // ===== Record Management =====

    /// Inserts the record, or replaces entirely the one with the same url
    fn upsert(&mut self, record: &Record, run_id: i64) -> StorageResult<()>;

    /// Gets the latest version of a record
    fn get(&self, url: &str) -> StorageResult<Option<Record>>;

    /// Counts distinct records
    fn count(&self) -> StorageResult<u64>;
}
