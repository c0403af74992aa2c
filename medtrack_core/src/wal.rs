//! Append-only adherence log.
//!
//! Records are appended to a JSONL (JSON Lines) file with file locking.
//! The duplicate-key check runs under the same exclusive lock as the
//! write, so a user action and a concurrent missed-sweep cannot both
//! record the same occurrence.

use crate::{AdherenceRecord, Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Record sink trait for persisting adherence records
pub trait RecordSink {
    fn append(&mut self, record: &AdherenceRecord) -> Result<()>;
}

/// JSONL-based record sink with file locking
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    /// Create a new JSONL sink for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Append under an already-held exclusive lock
    ///
    /// First-write-wins is enforced here, not in the caller: the ledger a
    /// caller loaded may be stale by the time the lock is granted, so the
    /// log is re-scanned for the key before anything is written.
    fn append_locked(file: &File, record: &AdherenceRecord) -> Result<()> {
        let reader = BufReader::new(file);
        for line_result in reader.lines() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(existing) = serde_json::from_str::<AdherenceRecord>(&line) {
                if existing.occurrence_key == record.occurrence_key {
                    return Err(Error::AlreadyRecorded(format!(
                        "{} is already {}",
                        existing.occurrence_key,
                        existing.status.as_str()
                    )));
                }
            }
        }

        let mut writer = std::io::BufWriter::new(file);
        let line = serde_json::to_string(record)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;

        tracing::debug!("Appended record {} to log", record.occurrence_key);
        Ok(())
    }
}

impl RecordSink for JsonlSink {
    fn append(&mut self, record: &AdherenceRecord) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        // Exclusive lock serializes concurrent writers
        file.lock_exclusive()?;

        let outcome = Self::append_locked(&file, record);

        file.unlock()?;
        outcome
    }
}

/// Read all adherence records from a log file
///
/// Unparseable lines are logged and skipped so one corrupt entry does not
/// take the whole history with it.
pub fn read_records(path: &Path) -> Result<Vec<AdherenceRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut records = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<AdherenceRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!("Failed to parse record at line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} records from log", records.len());
    Ok(records)
}
