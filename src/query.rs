// Filter, search and sort pipeline over a task snapshot

use crate::filter::Filter;
use crate::models::Task;
use chrono::{DateTime, TimeZone};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Result ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    /// Newest first
    #[default]
    Created,
    /// Hardest first, then by title
    Priority,
    /// Earliest deadline first, undated last, then by title
    Due,
    /// Alphabetical
    Title,
}

impl SortKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Created => "created",
            SortKey::Priority => "priority",
            SortKey::Due => "due",
            SortKey::Title => "title",
        }
    }

    /// Total order for this key
    ///
    /// Every key falls back to the id, so equal primary keys never depend on
    /// the order tasks happen to be stored in.
    pub fn compare(self, a: &Task, b: &Task) -> Ordering {
        let primary = match self {
            SortKey::Created => b.created_at.cmp(&a.created_at),
            SortKey::Priority => b
                .priority
                .weight()
                .cmp(&a.priority.weight())
                .then_with(|| compare_titles(&a.title, &b.title)),
            SortKey::Due => compare_due(a, b).then_with(|| compare_titles(&a.title, &b.title)),
            SortKey::Title => compare_titles(&a.title, &b.title),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

/// Case-insensitive first, so "apple" sorts before "Zoo"; exact text breaks ties
fn compare_titles(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn compare_due(a: &Task, b: &Task) -> Ordering {
    match (a.due, b.due) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(SortKey::Created),
            "priority" => Ok(SortKey::Priority),
            "due" => Ok(SortKey::Due),
            "title" => Ok(SortKey::Title),
            other => Err(format!(
                "unknown sort key: {} (expected created, priority, due or title)",
                other
            )),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive substring match over title, description, subject and priority
///
/// A blank term matches everything.
pub fn matches_search(task: &Task, term: &str) -> bool {
    if term.trim().is_empty() {
        return true;
    }
    let term = term.to_lowercase();
    [
        task.title.as_str(),
        task.description.as_str(),
        task.subject.as_str(),
        task.priority.as_str(),
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(&term))
}

/// One query: filter, then search, then sort
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub filter: Filter,
    pub sort: SortKey,
    pub search: String,
}

impl Query {
    pub fn new(filter: Filter, sort: SortKey, search: impl Into<String>) -> Self {
        Self {
            filter,
            sort,
            search: search.into(),
        }
    }

    /// Run against a borrowed collection, returning fresh copies
    pub fn run<Tz: TimeZone>(&self, tasks: &[Task], now: DateTime<Tz>) -> Vec<Task> {
        let mut results: Vec<Task> = tasks
            .iter()
            .filter(|t| self.filter.matches(t, now.clone()))
            .filter(|t| matches_search(t, &self.search))
            .cloned()
            .collect();
        results.sort_by(|a, b| self.sort.compare(a, b));
        results
    }
}
