// Data models for the task list

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Color assigned when nothing else is known
pub const DEFAULT_COLOR: &str = "#A78BFA";

/// Fixed palette new tasks draw their color from
pub const PALETTE: [&str; 10] = [
    "#A78BFA", // purple
    "#F59E0B", // yellow
    "#EF4444", // red
    "#10B981", // green
    "#06B6D4", // cyan
    "#8B5CF6", // violet
    "#F97316", // orange
    "#EC4899", // pink
    "#84CC16", // lime
    "#6366F1", // indigo
];

/// Pick a palette color at random
///
/// The low bits of a v7 UUID are random, which is all the randomness this needs.
pub fn random_color() -> String {
    let bytes = uuid::Uuid::now_v7().into_bytes();
    PALETTE[bytes[15] as usize % PALETTE.len()].to_string()
}

/// A single tracked to-do item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subject: String,
    #[serde(
        default,
        deserialize_with = "deserialize_due",
        skip_serializing_if = "Option::is_none"
    )]
    pub due: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Set the completion flag, keeping `completed_at` in step with it
    pub(crate) fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) {
        if completed == self.completed {
            return;
        }
        self.completed = completed;
        self.completed_at = if completed { Some(now) } else { None };
    }
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

/// Accepts `"YYYY-MM-DD"`, `""`, `null` or a missing field.
///
/// Older payloads store an empty string for "no deadline". An unparseable date
/// is dropped with a warning rather than failing the whole collection.
fn deserialize_due<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| parse_due(&s)))
}

/// Parse a due date, treating blank or malformed input as "no deadline"
pub fn parse_due(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(e) => {
            warn!(due = raw, error = %e, "Ignoring unparseable due date");
            None
        }
    }
}

/// Task difficulty, also used as the priority sort weight
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Priority {
    Easy,
    #[default]
    Normal,
    Hard,
}

impl Priority {
    pub fn weight(self) -> u8 {
        match self {
            Priority::Hard => 3,
            Priority::Normal => 2,
            Priority::Easy => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Easy => "easy",
            Priority::Normal => "normal",
            Priority::Hard => "hard",
        }
    }
}

// Stored payloads may carry values we don't know; those rank as normal.
impl From<String> for Priority {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Priority::Easy),
            "normal" => Ok(Priority::Normal),
            "hard" => Ok(Priority::Hard),
            other => Err(format!("unknown priority: {} (expected easy, normal or hard)", other)),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for creating a task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub due: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub color: Option<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn due(mut self, due: NaiveDate) -> Self {
        self.due = Some(due);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Partial update of a task; `None` leaves a field untouched
///
/// `due` is doubly optional: `Some(None)` clears the deadline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub due: Option<Option<NaiveDate>>,
    pub priority: Option<Priority>,
    pub color: Option<String>,
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Counts shown in the summary header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total: usize,
    pub completed: usize,
    pub active: usize,
    pub due_soon: usize,
    pub overdue: usize,
}

/// Version tag written into export bundles
pub const EXPORT_VERSION: &str = "1.0";

/// Backup produced by `TaskStore::export`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub tasks: Vec<Task>,
    pub exported_at: DateTime<Utc>,
    pub version: String,
}

/// A task-like record accepted by import
///
/// Everything except the title is optional; ids in the payload are ignored
/// since imported tasks always get fresh ones.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImportRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default, deserialize_with = "deserialize_due")]
    pub due: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}
