//! Schedule construction, validation, and versioned revision.
//!
//! A schedule is validated once at construction and immutable afterwards.
//! Edits produce a new version under the same id so adherence history
//! recorded against earlier versions is never rewritten.

use crate::{DayOfWeek, Error, Result, Schedule};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

/// Proposed schedule contents, prior to validation
///
/// An empty `days_of_week` means "every day" and is filled in during
/// validation.
#[derive(Clone, Debug, Default)]
pub struct ScheduleDraft {
    pub times_of_day: Vec<NaiveTime>,
    pub days_of_week: Vec<DayOfWeek>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl Schedule {
    /// Create the first version of a schedule from a draft
    ///
    /// Fails with [`Error::InvalidSchedule`] naming the violated constraint.
    pub fn create(medication_id: Uuid, start_date: NaiveDate, draft: ScheduleDraft) -> Result<Self> {
        let (times_of_day, days_of_week) = validate_draft(&draft)?;
        let start = draft.start_date.unwrap_or(start_date);
        check_date_order(start, draft.end_date)?;

        Ok(Schedule {
            id: Uuid::new_v4(),
            medication_id,
            version: 1,
            active: true,
            times_of_day,
            days_of_week,
            start_date: start,
            end_date: draft.end_date,
        })
    }

    /// Produce the next version of this schedule with updated contents
    ///
    /// Keeps the same `id` and bumps `version`; the caller is responsible
    /// for deactivating the old version (see `Registry::revise_schedule`).
    pub fn revise(&self, draft: ScheduleDraft) -> Result<Self> {
        let (times_of_day, days_of_week) = validate_draft(&draft)?;
        let start = draft.start_date.unwrap_or(self.start_date);
        let end = draft.end_date.or(self.end_date);
        check_date_order(start, end)?;

        Ok(Schedule {
            id: self.id,
            medication_id: self.medication_id,
            version: self.version + 1,
            active: true,
            times_of_day,
            days_of_week,
            start_date: start,
            end_date: end,
        })
    }

    /// Whether `at` is a valid occurrence instant for this schedule
    ///
    /// True when the date lies inside the validity range, the weekday is
    /// allowed, and the time matches one of `times_of_day`.
    pub fn covers(&self, at: NaiveDateTime) -> bool {
        let date = at.date();
        if date < self.start_date {
            return false;
        }
        if let Some(end) = self.end_date {
            if date > end {
                return false;
            }
        }
        if !self.days_of_week.contains(&DayOfWeek::from(date.weekday())) {
            return false;
        }
        self.times_of_day.contains(&at.time())
    }
}

fn validate_draft(draft: &ScheduleDraft) -> Result<(Vec<NaiveTime>, Vec<DayOfWeek>)> {
    if draft.times_of_day.is_empty() {
        return Err(Error::InvalidSchedule(
            "times_of_day must not be empty".into(),
        ));
    }

    let mut times = draft.times_of_day.clone();
    times.sort();
    if times.windows(2).any(|w| w[0] == w[1]) {
        return Err(Error::InvalidSchedule(
            "times_of_day must not contain duplicates".into(),
        ));
    }

    // Empty weekday set defaults to all seven days
    let mut days = if draft.days_of_week.is_empty() {
        DayOfWeek::ALL.to_vec()
    } else {
        draft.days_of_week.clone()
    };
    days.sort();
    days.dedup();

    Ok((times, days))
}

fn check_date_order(start: NaiveDate, end: Option<NaiveDate>) -> Result<()> {
    if let Some(end) = end {
        if end < start {
            return Err(Error::InvalidSchedule(format!(
                "end_date {} precedes start_date {}",
                end, start
            )));
        }
    }
    Ok(())
}
