//! Core domain types for the medication tracking system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Medications and their dosing schedules
//! - Reminder occurrences derived from schedules
//! - Adherence records and their status state machine

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Medication Types
// ============================================================================

/// A medication entry owned by the user
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Medication {
    pub id: Uuid,
    pub name: String,
    pub dose: Option<String>,
    pub notes: Option<String>,
    pub active: bool,
}

impl Medication {
    pub fn new(name: impl Into<String>, dose: Option<String>, notes: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            dose,
            notes,
            active: true,
        }
    }
}

// ============================================================================
// Schedule Types
// ============================================================================

/// Day of the week a schedule applies to
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayOfWeek {
    /// All seven days, Monday first
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Mon,
        DayOfWeek::Tue,
        DayOfWeek::Wed,
        DayOfWeek::Thu,
        DayOfWeek::Fri,
        DayOfWeek::Sat,
        DayOfWeek::Sun,
    ];
}

impl From<Weekday> for DayOfWeek {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => DayOfWeek::Mon,
            Weekday::Tue => DayOfWeek::Tue,
            Weekday::Wed => DayOfWeek::Wed,
            Weekday::Thu => DayOfWeek::Thu,
            Weekday::Fri => DayOfWeek::Fri,
            Weekday::Sat => DayOfWeek::Sat,
            Weekday::Sun => DayOfWeek::Sun,
        }
    }
}

/// A dosing schedule for a medication
///
/// Schedules are immutable once created; edits go through
/// [`Schedule::revise`], which produces a new version under the same `id`
/// so that already-recorded adherence history is never rewritten.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub medication_id: Uuid,
    pub version: u32,
    pub active: bool,
    /// Sorted, unique reminder times (wall-clock local)
    pub times_of_day: Vec<NaiveTime>,
    /// Sorted weekdays the schedule applies to; never empty
    pub days_of_week: Vec<DayOfWeek>,
    pub start_date: NaiveDate,
    /// Inclusive; `None` means open-ended
    pub end_date: Option<NaiveDate>,
}

// ============================================================================
// Occurrence Types
// ============================================================================

/// One concrete scheduled reminder instant derived from a schedule
///
/// Occurrences are derived on demand and never persisted; the only persisted
/// derived entity is the [`AdherenceRecord`] written against an occurrence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Occurrence {
    pub schedule_id: Uuid,
    pub medication_id: Uuid,
    /// Wall-clock local; deliberately offset-free so a 08:00 dose stays
    /// at 08:00 across daylight-saving shifts
    pub scheduled_at: NaiveDateTime,
}

impl Occurrence {
    pub fn key(&self) -> OccurrenceKey {
        OccurrenceKey::new(self.schedule_id, self.scheduled_at)
    }
}

/// Deterministic composite key identifying one occurrence
///
/// Format: `<schedule_id>@<YYYY-MM-DDTHH:MM>`. The same schedule and minute
/// always produce the same key, which is what makes first-write-wins
/// adherence recording possible.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct OccurrenceKey(String);

impl OccurrenceKey {
    pub fn new(schedule_id: Uuid, scheduled_at: NaiveDateTime) -> Self {
        Self(format!(
            "{}@{}",
            schedule_id,
            scheduled_at.format("%Y-%m-%dT%H:%M")
        ))
    }

    /// Split a key back into its schedule id and scheduled time
    pub fn decompose(&self) -> crate::Result<(Uuid, NaiveDateTime)> {
        let (id_part, time_part) = self
            .0
            .split_once('@')
            .ok_or_else(|| crate::Error::Parse(format!("malformed occurrence key: {}", self.0)))?;

        let schedule_id = Uuid::parse_str(id_part)
            .map_err(|e| crate::Error::Parse(format!("bad schedule id in key: {}", e)))?;

        let scheduled_at = NaiveDateTime::parse_from_str(time_part, "%Y-%m-%dT%H:%M")
            .map_err(|e| crate::Error::Parse(format!("bad timestamp in key: {}", e)))?;

        Ok((schedule_id, scheduled_at))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OccurrenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for OccurrenceKey {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let key = OccurrenceKey(s.to_string());
        key.decompose()?;
        Ok(key)
    }
}

// ============================================================================
// Adherence Types
// ============================================================================

/// Adherence state for one occurrence
///
/// The only legal transitions are `pending` to one of the three terminal
/// states; nothing ever leaves `taken`, `skipped`, or `missed`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdherenceStatus {
    Pending,
    Taken,
    Skipped,
    Missed,
}

impl AdherenceStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AdherenceStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdherenceStatus::Pending => "pending",
            AdherenceStatus::Taken => "taken",
            AdherenceStatus::Skipped => "skipped",
            AdherenceStatus::Missed => "missed",
        }
    }
}

/// A persisted adherence record for one occurrence
///
/// At most one record exists per occurrence key; records are created lazily
/// the first time a status is written or the missed-sweep reaches them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdherenceRecord {
    pub occurrence_key: OccurrenceKey,
    pub schedule_id: Uuid,
    pub medication_id: Uuid,
    pub scheduled_at: NaiveDateTime,
    pub status: AdherenceStatus,
    /// When the terminal status was written; absent while pending
    pub recorded_at: Option<NaiveDateTime>,
}
