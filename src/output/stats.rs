//! Statistics from harvest outputs
//!
//! This module reads a source's output directory and keyed store without
//! modifying either, for display with `--stats`.

use crate::config::{HarvesterConfig, SourceConfig};
use crate::crawler::RunSummary;
use crate::storage::{log_path, store_path, RecordStore, RunRecord, SqliteRecordStore};
use crate::Result;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Harvest statistics of one source
#[derive(Debug, Clone)]
pub struct SourceStatistics {
    pub source: String,
    pub kind: &'static str,
    pub source_dir: PathBuf,

    /// Distinct records in the keyed store
    pub records: u64,

    /// Lines in the record log, duplicates included
    pub log_lines: u64,

    /// Files in the source directory other than the log and the store
    pub asset_files: u64,

    /// Most recent runs, newest first
    pub recent_runs: Vec<RunRecord>,
}

/// Loads statistics for one source
///
/// A source that was never run yields zero counts; nothing is created.
///
/// # Arguments
///
/// * `harvester` - Where the outputs live
/// * `source` - The source to inspect
/// * `run_limit` - How many recent runs to include
pub fn load_statistics(
    harvester: &HarvesterConfig,
    source: &SourceConfig,
    run_limit: usize,
) -> Result<SourceStatistics> {
    let name = source.name();
    let source_dir = harvester.source_dir(name);

    let db = store_path(&source_dir, name);
    let (records, recent_runs) = if db.exists() {
        let store = SqliteRecordStore::open(&db)?;
        (store.count()?, store.recent_runs(run_limit)?)
    } else {
        (0, Vec::new())
    };

    let log = log_path(&source_dir, name);
    let log_lines = if log.exists() { count_lines(&log)? } else { 0 };

    let asset_files = if source_dir.exists() {
        count_assets(&source_dir, name)?
    } else {
        0
    };

    Ok(SourceStatistics {
        source: name.to_string(),
        kind: source.kind(),
        source_dir,
        records,
        log_lines,
        asset_files,
        recent_runs,
    })
}

fn count_lines(path: &Path) -> std::io::Result<u64> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut count = 0;
    for line in reader.lines() {
        if !line?.trim().is_empty() {
            count += 1;
        }
    }
    Ok(count)
}

fn count_assets(dir: &Path, source: &str) -> std::io::Result<u64> {
    let own_files = [
        format!("{}.jsonl", source),
        format!("{}.db", source),
        format!("{}.db-journal", source),
    ];

    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if own_files.contains(&file_name) || file_name.ends_with(".part") {
            continue;
        }
        count += 1;
    }
    Ok(count)
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &[SourceStatistics]) {
    println!("=== Harvest Statistics ===");

    for source in stats {
        println!();
        println!("{} ({})", source.source, source.kind);
        println!("  Directory: {}", source.source_dir.display());
        println!("  Records: {}", source.records);
        println!("  Log lines: {}", source.log_lines);
        println!("  Asset files: {}", source.asset_files);

        if source.recent_runs.is_empty() {
            println!("  No runs recorded");
            continue;
        }

        println!("  Recent runs:");
        for run in &source.recent_runs {
            println!(
                "    #{} {} {} -> {}: {} records, {} assets, {} failed fetches",
                run.id,
                run.status.to_db_string(),
                run.started_at,
                run.finished_at.as_deref().unwrap_or("-"),
                run.counters.records_extracted,
                run.counters.assets_saved,
                run.counters.fetch_failures
            );
        }
    }
}

/// Prints the outcome of one run
pub fn print_run_summary(summary: &RunSummary) {
    println!(
        "{} ({}), run #{}: {} | {} documents fetched, {} records, {} assets, {} failed fetches in {:.1}s",
        summary.source,
        summary.kind,
        summary.run_id,
        summary.status.to_db_string(),
        summary.pages_fetched,
        summary.counters.records_extracted,
        summary.counters.assets_saved,
        summary.counters.fetch_failures,
        summary.elapsed.as_secs_f64()
    );
}
