//! Interval arithmetic for scheduled jobs.
//!
//! A [`Schedule`] describes when a job recurs: an interval magnitude and
//! unit, plus an optional time-of-day anchor and start weekday for day/week
//! units. [`Schedule::next_run`] is a pure function of (last run, now), so
//! the arithmetic is testable without a running scheduler.

use bon::Builder;
use chrono::{DateTime, Duration as ChronoDuration, Datelike, NaiveTime, Utc, Weekday};
use gatewarden_types::{Error, Result};

/// Scheduling interval unit across five granularities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum IntervalUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

/// Parse a time-of-day anchor in `HH:MM` or `HH:MM:SS` form.
///
/// # Errors
///
/// Returns a validation error on any other shape, including out-of-range
/// components.
pub fn parse_time_of_day(input: &str) -> Result<NaiveTime> {
    let parts: Vec<&str> = input.split(':').collect();
    if parts.len() != 2 && parts.len() != 3 {
        return Err(Error::validation(format!(
            "time-of-day must be HH:MM or HH:MM:SS, got: {input}"
        )));
    }

    let mut fields = [0u32; 3];
    for (i, part) in parts.iter().enumerate() {
        fields[i] = part.parse().map_err(|_| {
            Error::validation(format!("time-of-day component '{part}' is not a number: {input}"))
        })?;
    }

    NaiveTime::from_hms_opt(fields[0], fields[1], fields[2])
        .ok_or_else(|| Error::validation(format!("time-of-day out of range: {input}")))
}

/// Recurrence description for a scheduled job.
#[derive(Debug, Clone, Builder)]
pub struct Schedule {
    /// Interval magnitude. Must be at least 1.
    pub every: u64,
    /// Interval unit.
    pub unit: IntervalUnit,
    /// Time-of-day anchor, applied to day and week units.
    pub at: Option<NaiveTime>,
    /// Start weekday, applied to week units.
    pub weekday: Option<Weekday>,
}

impl Schedule {
    /// Convenience constructor for plain second intervals.
    pub fn every_seconds(every: u64) -> Self {
        Self { every, unit: IntervalUnit::Seconds, at: None, weekday: None }
    }

    fn period(&self) -> ChronoDuration {
        let every = i64::try_from(self.every).unwrap_or(i64::MAX);
        match self.unit {
            IntervalUnit::Seconds => ChronoDuration::seconds(every),
            IntervalUnit::Minutes => ChronoDuration::minutes(every),
            IntervalUnit::Hours => ChronoDuration::hours(every),
            IntervalUnit::Days => ChronoDuration::days(every),
            IntervalUnit::Weeks => ChronoDuration::weeks(every),
        }
    }

    /// Compute the next occurrence after `last_run`, never earlier than
    /// `now`.
    ///
    /// Second/minute/hour units step from the last run directly. Day/week
    /// units anchor to midnight UTC plus the configured time-of-day offset,
    /// and week units additionally advance to the configured start weekday.
    /// In all cases the period is added repeatedly until the result neither
    /// precedes `now` nor fails to advance past `last_run`.
    pub fn next_run(&self, last_run: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        let period = self.period();

        let mut next = match self.unit {
            IntervalUnit::Seconds | IntervalUnit::Minutes | IntervalUnit::Hours => {
                last_run + period
            },
            IntervalUnit::Days | IntervalUnit::Weeks => {
                let offset = self.at.unwrap_or(NaiveTime::MIN);
                let mut date = last_run.date_naive();

                if self.unit == IntervalUnit::Weeks {
                    if let Some(weekday) = self.weekday {
                        let ahead = (weekday.num_days_from_monday() + 7
                            - date.weekday().num_days_from_monday())
                            % 7;
                        date += ChronoDuration::days(i64::from(ahead));
                    }
                }

                date.and_time(offset).and_utc()
            },
        };

        while next < now || next <= last_run {
            next += period;
        }
        next
    }
}
