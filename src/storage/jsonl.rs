//! Append-only JSON-lines record log
//!
//! Every persisted record becomes one line. Nothing is ever rewritten, so
//! the log holds the full history including duplicates across runs.

use crate::extract::Record;
use crate::storage::traits::StorageResult;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Append-only JSON-lines writer
pub struct JsonLinesLog {
    writer: BufWriter<File>,
}

impl JsonLinesLog {
    /// Opens `path` for appending, creating it if needed
    ///
    /// A trailing partial line left by an interrupted writer is terminated
    /// so the next record starts on a fresh line.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        if ends_without_newline(&mut file)? {
            tracing::warn!(log = %path.display(), "Terminating partial trailing line");
            file.write_all(b"\n")?;
        }

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Appends one record as a single line and flushes it
    pub fn append(&mut self, record: &Record) -> StorageResult<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

fn ends_without_newline(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }

    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Reads every record back from a log, in write order
///
/// Lines that do not parse are skipped with a warning.
pub fn read_records(path: &Path) -> StorageResult<Vec<Record>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Record>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(log = %path.display(), line = index + 1, "Skipping bad line: {}", e)
            }
        }
    }

    Ok(records)
}
