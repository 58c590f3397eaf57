//! Database schema definitions
//!
//! This module contains the SQL schema of the per-source keyed store.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    records_extracted INTEGER NOT NULL DEFAULT 0,
    assets_saved INTEGER NOT NULL DEFAULT 0,
    fetch_failures INTEGER NOT NULL DEFAULT 0
);

-- Latest version of every record, keyed by url
CREATE TABLE IF NOT EXISTS records (
    url TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    first_seen_run INTEGER NOT NULL,
    updated_run INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_updated_run ON records(updated_run);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
