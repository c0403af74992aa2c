//! Adherence ledger: the per-occurrence status state machine.
//!
//! The ledger is first-write-wins per occurrence key. A record enters in a
//! terminal state (written by the user or by the missed-sweep) and nothing
//! ever overwrites it, so a race between a user action and the sweep cannot
//! produce two conflicting records for the same dose.

use crate::occurrence::occurrences_between;
use crate::wal::RecordSink;
use crate::{
    AdherenceRecord, AdherenceStatus, Error, Occurrence, OccurrenceKey, Result, Schedule,
};
use chrono::{Duration, NaiveDateTime};
use std::collections::HashMap;
use uuid::Uuid;

/// Adherence counts for one medication over a query window
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdherenceStats {
    pub taken: usize,
    pub skipped: usize,
    pub missed: usize,
}

impl AdherenceStats {
    /// `taken / (taken + skipped + missed)`, or `None` when there is no
    /// data. Zero occurrences never report as a numeric rate.
    pub fn rate(&self) -> Option<f64> {
        let total = self.taken + self.skipped + self.missed;
        if total == 0 {
            None
        } else {
            Some(self.taken as f64 / total as f64)
        }
    }
}

/// In-memory view of all adherence records, keyed by occurrence
#[derive(Debug, Default)]
pub struct AdherenceLedger {
    records: HashMap<OccurrenceKey, AdherenceRecord>,
}

impl AdherenceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted records
    ///
    /// First write wins on duplicate keys; later duplicates are logged and
    /// dropped so a replayed append can never flip a terminal status.
    pub fn from_records(records: Vec<AdherenceRecord>) -> Self {
        let mut ledger = Self::new();
        for record in records {
            if let Some(existing) = ledger.records.get(&record.occurrence_key) {
                tracing::warn!(
                    "Duplicate adherence record for {} ({} kept, {} dropped)",
                    record.occurrence_key,
                    existing.status.as_str(),
                    record.status.as_str()
                );
                continue;
            }
            ledger.records.insert(record.occurrence_key.clone(), record);
        }
        ledger
    }

    pub fn get(&self, key: &OccurrenceKey) -> Option<&AdherenceRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &AdherenceRecord> {
        self.records.values()
    }

    /// Record a terminal status for one occurrence
    ///
    /// Fails with [`Error::UnknownOccurrence`] if `scheduled_at` is not a
    /// valid occurrence of `schedule`, and [`Error::AlreadyRecorded`] if a
    /// terminal status already exists for the key (the ledger is unchanged
    /// by the failed call).
    pub fn record_status(
        &mut self,
        schedule: &Schedule,
        scheduled_at: NaiveDateTime,
        status: AdherenceStatus,
        at: NaiveDateTime,
    ) -> Result<AdherenceRecord> {
        if !status.is_terminal() {
            return Err(Error::Ledger(format!(
                "cannot record non-terminal status '{}'",
                status.as_str()
            )));
        }

        let key = OccurrenceKey::new(schedule.id, scheduled_at);

        // A superseded version may be passed here so doses scheduled
        // before a revision stay recordable; resolving a live version
        // is the caller's job (see Registry::recordable_schedule).
        if !schedule.covers(scheduled_at) {
            return Err(Error::UnknownOccurrence(key.to_string()));
        }

        if let Some(existing) = self.records.get(&key) {
            return Err(Error::AlreadyRecorded(format!(
                "{} is already {}",
                key,
                existing.status.as_str()
            )));
        }

        let record = AdherenceRecord {
            occurrence_key: key.clone(),
            schedule_id: schedule.id,
            medication_id: schedule.medication_id,
            scheduled_at,
            status,
            recorded_at: Some(at),
        };
        self.records.insert(key, record.clone());

        tracing::info!(
            "Recorded {} for {}",
            record.status.as_str(),
            record.occurrence_key
        );
        Ok(record)
    }

    /// Mark every unrecorded occurrence past its grace deadline as missed
    ///
    /// Covers all active schedules from their start up to `as_of - grace`
    /// (strictly before, matching `scheduled_at + grace < as_of`).
    /// Idempotent: a second sweep with the same `as_of` changes nothing.
    pub fn sweep_missed(
        &mut self,
        schedules: &[Schedule],
        grace: Duration,
        as_of: NaiveDateTime,
    ) -> Vec<AdherenceRecord> {
        let cutoff = as_of - grace;
        let mut newly_missed = Vec::new();

        for schedule in schedules.iter().filter(|s| s.active) {
            let window_start = schedule.start_date.and_hms_opt(0, 0, 0);
            let Some(window_start) = window_start else {
                continue;
            };

            for occurrence in occurrences_between(schedule, window_start, cutoff) {
                let key = occurrence.key();
                if self.records.contains_key(&key) {
                    continue;
                }

                let record = AdherenceRecord {
                    occurrence_key: key.clone(),
                    schedule_id: occurrence.schedule_id,
                    medication_id: occurrence.medication_id,
                    scheduled_at: occurrence.scheduled_at,
                    status: AdherenceStatus::Missed,
                    recorded_at: Some(as_of),
                };
                self.records.insert(key, record.clone());
                newly_missed.push(record);
            }
        }

        if !newly_missed.is_empty() {
            tracing::info!("Sweep marked {} occurrences missed", newly_missed.len());
        }
        newly_missed
    }

    /// Sweep and persist the newly missed records through `sink`
    ///
    /// A record that fails to persist is logged, rolled back from the
    /// in-memory ledger, and skipped; the rest of the sweep proceeds and
    /// the next sweep converges on whatever was left behind.
    pub fn sweep_missed_into(
        &mut self,
        schedules: &[Schedule],
        grace: Duration,
        as_of: NaiveDateTime,
        sink: &mut dyn RecordSink,
    ) -> Vec<AdherenceRecord> {
        let newly_missed = self.sweep_missed(schedules, grace, as_of);
        let mut persisted = Vec::with_capacity(newly_missed.len());

        for record in newly_missed {
            match sink.append(&record) {
                Ok(()) => persisted.push(record),
                Err(e) => {
                    tracing::warn!(
                        "Failed to persist missed record for {}: {}. Skipping.",
                        record.occurrence_key,
                        e
                    );
                    self.records.remove(&record.occurrence_key);
                }
            }
        }

        persisted
    }

    /// Occurrences of `schedule` in `[from, to)` with no record yet
    ///
    /// This is the lookup an external reminder-delivery layer polls for due
    /// doses; the core never performs delivery itself.
    pub fn pending_occurrences(
        &self,
        schedule: &Schedule,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Vec<Occurrence> {
        occurrences_between(schedule, from, to)
            .filter(|occ| !self.records.contains_key(&occ.key()))
            .collect()
    }

    /// Adherence counts for a medication over `[from, to)`
    pub fn stats(&self, medication_id: Uuid, from: NaiveDateTime, to: NaiveDateTime) -> AdherenceStats {
        let mut stats = AdherenceStats::default();
        for record in self.records.values() {
            if record.medication_id != medication_id {
                continue;
            }
            if record.scheduled_at < from || record.scheduled_at >= to {
                continue;
            }
            match record.status {
                AdherenceStatus::Taken => stats.taken += 1,
                AdherenceStatus::Skipped => stats.skipped += 1,
                AdherenceStatus::Missed => stats.missed += 1,
                AdherenceStatus::Pending => {}
            }
        }
        stats
    }
}
