//! UTC collection windows.
//!
//! Windows are half-open (`[start, end)`) and always anchored to midnight UTC
//! of the current day, so a run produces the same window regardless of the
//! host timezone.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::fmt;

/// Length of the period covered by a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    /// Yesterday, midnight to midnight.
    Day,
    /// The seven days before today.
    Week,
}

impl Period {
    pub fn from_weekly_flag(weekly: bool) -> Self {
        if weekly { Period::Week } else { Period::Day }
    }

    fn days(self) -> i64 {
        match self {
            Period::Day => 1,
            Period::Week => 7,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Day => write!(f, "day"),
            Period::Week => write!(f, "week"),
        }
    }
}

/// Half-open UTC interval used to select news items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub period: Period,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// Compute the window for `period` ending at today's midnight (UTC).
    pub fn for_period(period: Period, now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let end = midnight(today);
        let start = midnight(today - Duration::days(period.days()));
        Self { period, start, end }
    }

    /// `true` if `t` lies inside `[start, end)`.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    /// `true` if `t` is older than the window start; history scans stop here.
    pub fn is_before(&self, t: DateTime<Utc>) -> bool {
        t < self.start
    }

    /// Date label for prompts and logs: `2024-06-09` for a day,
    /// `2024-06-03 - 2024-06-10` for a week.
    pub fn label(&self) -> String {
        match self.period {
            Period::Day => self.start.format("%Y-%m-%d").to_string(),
            Period::Week => format!(
                "{} - {}",
                self.start.format("%Y-%m-%d"),
                self.end.format("%Y-%m-%d")
            ),
        }
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}
