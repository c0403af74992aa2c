//! Adherence history loading.
//!
//! Rebuilds the full record set from both the live JSONL log and the CSV
//! archive produced by rollups, deduplicating by occurrence key.

use crate::{AdherenceRecord, AdherenceStatus, OccurrenceKey, Result};
use chrono::NaiveDateTime;
use csv::ReaderBuilder;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

/// CSV row format for reading archived records
#[derive(Debug, Deserialize)]
struct CsvRow {
    occurrence_key: String,
    schedule_id: String,
    medication_id: String,
    scheduled_at: String,
    status: String,
    recorded_at: Option<String>,
}

impl TryFrom<CsvRow> for AdherenceRecord {
    type Error = crate::Error;

    fn try_from(row: CsvRow) -> Result<Self> {
        let occurrence_key: OccurrenceKey = row.occurrence_key.parse()?;

        let schedule_id = Uuid::parse_str(&row.schedule_id)
            .map_err(|e| crate::Error::Other(format!("Invalid UUID: {}", e)))?;
        let medication_id = Uuid::parse_str(&row.medication_id)
            .map_err(|e| crate::Error::Other(format!("Invalid UUID: {}", e)))?;

        let scheduled_at = parse_timestamp(&row.scheduled_at)?;
        let recorded_at = row
            .recorded_at
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(parse_timestamp)
            .transpose()?;

        let status = match row.status.as_str() {
            "pending" => AdherenceStatus::Pending,
            "taken" => AdherenceStatus::Taken,
            "skipped" => AdherenceStatus::Skipped,
            "missed" => AdherenceStatus::Missed,
            other => {
                return Err(crate::Error::Other(format!("Invalid status: {}", other)));
            }
        };

        Ok(AdherenceRecord {
            occurrence_key,
            schedule_id,
            medication_id,
            scheduled_at,
            status,
            recorded_at,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .map_err(|e| crate::Error::Other(format!("Invalid timestamp: {}", e)))
}

/// Load all adherence records from the live log and the CSV archive
///
/// The live log is read first; archived rows with a key already seen are
/// dropped, so a record that was rolled up mid-run never counts twice.
pub fn load_records(wal_path: &Path, csv_path: &Path) -> Result<Vec<AdherenceRecord>> {
    let mut records = Vec::new();
    let mut seen_keys = HashSet::new();

    if wal_path.exists() {
        for record in crate::wal::read_records(wal_path)? {
            seen_keys.insert(record.occurrence_key.clone());
            records.push(record);
        }
        tracing::debug!("Loaded {} records from log", records.len());
    }

    if csv_path.exists() {
        let mut csv_count = 0;
        for record in load_records_from_csv(csv_path)? {
            if !seen_keys.contains(&record.occurrence_key) {
                seen_keys.insert(record.occurrence_key.clone());
                records.push(record);
                csv_count += 1;
            }
        }
        tracing::debug!("Loaded {} records from CSV archive", csv_count);
    }

    tracing::info!("Loaded {} total adherence records", records.len());
    Ok(records)
}

/// Load all records from a CSV archive
fn load_records_from_csv(path: &Path) -> Result<Vec<AdherenceRecord>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;

    let mut records = Vec::new();
    for result in reader.deserialize::<CsvRow>() {
        match result {
            Ok(row) => match AdherenceRecord::try_from(row) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!("Failed to parse CSV row: {}", e);
                }
            },
            Err(e) => {
                tracing::warn!("Failed to deserialize CSV row: {}", e);
            }
        }
    }

    Ok(records)
}
