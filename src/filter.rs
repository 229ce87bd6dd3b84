// Due-date classification and list filters

use crate::models::Task;
use chrono::{DateTime, NaiveTime, Offset, TimeZone};
use std::fmt;
use std::str::FromStr;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// A task due within this many whole days (inclusive) is due soon
pub const DUE_SOON_DAYS: i64 = 3;

/// Where a task stands relative to its deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueStatus {
    /// No deadline, already completed, or comfortably far out
    None,
    DueSoon,
    Overdue,
}

impl DueStatus {
    /// Classify a task against `now`
    ///
    /// Calendar days are taken in `now`'s timezone: a due date stands for
    /// 00:00 of that day at `now`'s offset. Overdue compares calendar dates, so
    /// a task due today is never overdue. Due-soon takes the ceiling of the
    /// fractional day difference, so any time left on a day counts as a whole
    /// day.
    pub fn classify<Tz: TimeZone>(task: &Task, now: DateTime<Tz>) -> Self {
        if task.completed {
            return DueStatus::None;
        }
        let Some(due) = task.due else {
            return DueStatus::None;
        };

        if due < now.date_naive() {
            return DueStatus::Overdue;
        }

        let offset_ms = i64::from(now.offset().fix().local_minus_utc()) * 1000;
        let due_start_ms = due.and_time(NaiveTime::MIN).and_utc().timestamp_millis() - offset_ms;
        let diff_days = ceil_div(due_start_ms - now.timestamp_millis(), DAY_MS);
        if (0..=DUE_SOON_DAYS).contains(&diff_days) {
            DueStatus::DueSoon
        } else {
            DueStatus::None
        }
    }

    pub fn is_overdue(self) -> bool {
        self == DueStatus::Overdue
    }

    pub fn is_due_soon(self) -> bool {
        self == DueStatus::DueSoon
    }
}

fn ceil_div(n: i64, d: i64) -> i64 {
    let q = n.div_euclid(d);
    if n.rem_euclid(d) > 0 { q + 1 } else { q }
}

/// Which tasks a query keeps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Filter {
    #[default]
    All,
    Active,
    Completed,
    Overdue,
    DueSoon,
}

impl Filter {
    pub fn matches<Tz: TimeZone>(self, task: &Task, now: DateTime<Tz>) -> bool {
        match self {
            Filter::All => true,
            Filter::Active => !task.completed,
            Filter::Completed => task.completed,
            Filter::Overdue => DueStatus::classify(task, now).is_overdue(),
            Filter::DueSoon => DueStatus::classify(task, now).is_due_soon(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Filter::All => "all",
            Filter::Active => "active",
            Filter::Completed => "completed",
            Filter::Overdue => "overdue",
            Filter::DueSoon => "due_soon",
        }
    }
}

impl FromStr for Filter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Filter::All),
            "active" => Ok(Filter::Active),
            "completed" => Ok(Filter::Completed),
            "overdue" => Ok(Filter::Overdue),
            "due_soon" => Ok(Filter::DueSoon),
            other => Err(format!(
                "unknown filter: {} (expected all, active, completed, overdue or due_soon)",
                other
            )),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
