//! Occurrence generation: expanding a schedule over a query window.
//!
//! Generation is pure and deterministic; the same schedule and window always
//! yield the same ascending sequence, and nothing is materialized beyond
//! what the caller consumes.

use crate::{DayOfWeek, Occurrence, Schedule};
use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// Expand `schedule` over the half-open window `[from, to)`
///
/// The window is intersected with the schedule's validity range and weekday
/// filter before expansion; an empty intersection yields an empty iterator.
/// Timestamps are wall-clock local, so windows spanning a daylight-saving
/// transition keep a 08:00 reminder at 08:00.
pub fn occurrences_between<'a>(
    schedule: &'a Schedule,
    from: NaiveDateTime,
    to: NaiveDateTime,
) -> Occurrences<'a> {
    // Clamp the date range to the schedule's validity window up front so an
    // open-ended end_date never drives unbounded generation.
    let first = schedule.start_date.max(from.date());
    let mut last = to.date();
    if let Some(end) = schedule.end_date {
        last = last.min(end);
    }

    Occurrences {
        schedule,
        from,
        to,
        date: first,
        last,
        time_idx: 0,
    }
}

/// Lazy, finite, restartable iterator over a schedule's occurrences
pub struct Occurrences<'a> {
    schedule: &'a Schedule,
    from: NaiveDateTime,
    to: NaiveDateTime,
    date: NaiveDate,
    last: NaiveDate,
    time_idx: usize,
}

impl<'a> Iterator for Occurrences<'a> {
    type Item = Occurrence;

    fn next(&mut self) -> Option<Occurrence> {
        while self.date <= self.last {
            if self
                .schedule
                .days_of_week
                .contains(&DayOfWeek::from(self.date.weekday()))
            {
                while self.time_idx < self.schedule.times_of_day.len() {
                    let time = self.schedule.times_of_day[self.time_idx];
                    self.time_idx += 1;

                    let scheduled_at = self.date.and_time(time);
                    if scheduled_at >= self.from && scheduled_at < self.to {
                        return Some(Occurrence {
                            schedule_id: self.schedule.id,
                            medication_id: self.schedule.medication_id,
                            scheduled_at,
                        });
                    }
                }
            }

            self.date = self.date.succ_opt()?;
            self.time_idx = 0;
        }

        None
    }
}
