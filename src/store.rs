// Task store: owns the collection, mirrors it to storage, answers queries

use crate::clock::{Clock, SystemClock};
use crate::filter::{DueStatus, Filter};
use crate::models::{
    EXPORT_VERSION, ExportBundle, ImportRecord, NewTask, Statistics, Task, TaskPatch, random_color,
};
use crate::query::{Query, SortKey};
use crate::storage::{DEFAULT_STORAGE_KEY, Storage};
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The single source of truth for the task list
///
/// The collection is read from storage on construction and written back in
/// full after every mutation. Storage failures never reach the caller: a
/// failed read starts from an empty list, a failed write keeps the in-memory
/// change and marks the store dirty so the next mutation writes again.
/// `flush()` is there for callers that want to see the error.
pub struct TaskStore<S: Storage, C: Clock = SystemClock> {
    storage: S,
    clock: C,
    key: String,
    tasks: Vec<Task>,
    dirty: bool,
}

impl<S: Storage> TaskStore<S, SystemClock> {
    /// Open the default task list in `storage`, using wall-clock time
    pub fn new(storage: S) -> Self {
        Self::with_clock(storage, SystemClock)
    }
}

impl<S: Storage, C: Clock> TaskStore<S, C> {
    pub fn with_clock(storage: S, clock: C) -> Self {
        Self::with_key(storage, clock, DEFAULT_STORAGE_KEY)
    }

    /// Open the task list stored under `key`
    pub fn with_key(storage: S, clock: C, key: impl Into<String>) -> Self {
        let mut store = Self {
            storage,
            clock,
            key: key.into(),
            tasks: Vec::new(),
            dirty: false,
        };
        store.load();
        store
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// True when the last write to storage failed and has not been retried yet
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Re-read the collection from storage, replacing what is in memory
    ///
    /// Missing or unreadable data yields an empty list.
    pub fn load(&mut self) -> Vec<Task> {
        self.tasks = self.read_tasks();
        self.dirty = false;
        self.tasks.clone()
    }

    /// Write the collection now, returning any storage error
    pub fn flush(&mut self) -> Result<()> {
        self.write_tasks()?;
        self.dirty = false;
        Ok(())
    }

    fn read_tasks(&self) -> Vec<Task> {
        let raw = match self.storage.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = %self.key, "No stored tasks, starting empty");
                return Vec::new();
            }
            Err(e) => {
                warn!(key = %self.key, error = ?e, "Failed to read stored tasks, starting empty");
                return Vec::new();
            }
        };

        let values: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(values) => values,
            Err(e) => {
                warn!(key = %self.key, error = ?e, "Stored tasks are corrupt, starting empty");
                return Vec::new();
            }
        };

        // One bad record must not cost the rest of the list
        let tasks = values
            .into_iter()
            .enumerate()
            .filter_map(|(i, value)| match serde_json::from_value::<Task>(value) {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!(key = %self.key, index = i, error = %e, "Skipping malformed stored task");
                    None
                }
            })
            .collect();

        let tasks = normalize_loaded(tasks);
        info!(key = %self.key, count = tasks.len(), "Loaded tasks");
        tasks
    }

    fn write_tasks(&mut self) -> Result<()> {
        let json = serde_json::to_string(&self.tasks).context("Failed to serialize tasks")?;
        self.storage
            .set(&self.key, &json)
            .wrap_err_with(|| format!("Failed to save tasks under key {}", self.key))
    }

    fn persist(&mut self) {
        match self.write_tasks() {
            Ok(()) => {
                if self.dirty {
                    info!(key = %self.key, "Storage caught up after an earlier failed save");
                }
                self.dirty = false;
            }
            Err(e) => {
                error!(key = %self.key, error = ?e, "Failed to save tasks, keeping in-memory changes");
                self.dirty = true;
            }
        }
    }

    fn fresh_id(&self, pending: &[Task]) -> String {
        loop {
            let id = Uuid::now_v7().to_string();
            let taken = self.tasks.iter().chain(pending).any(|t| t.id == id);
            if !taken {
                return id;
            }
        }
    }

    // ========================================================================
    // CRUD
    // ========================================================================

    /// Snapshot of every task, newest insert first
    pub fn all(&self) -> Vec<Task> {
        self.tasks.clone()
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks.iter().find(|t| t.id == id).cloned()
    }

    /// Create a task at the front of the list
    ///
    /// Text fields are trimmed. A blank title is rejected.
    pub fn add(&mut self, new: NewTask) -> Result<Task> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(eyre!("Task title cannot be empty"));
        }

        let now = self.clock.now();
        let task = Task {
            id: self.fresh_id(&[]),
            title: title.to_string(),
            description: new.description.as_deref().map(str::trim).unwrap_or_default().to_string(),
            subject: new.subject.as_deref().map(str::trim).unwrap_or_default().to_string(),
            due: new.due,
            priority: new.priority.unwrap_or_default(),
            color: new.color.unwrap_or_else(random_color),
            completed: false,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        self.tasks.insert(0, task.clone());
        info!(id = %task.id, title = %task.title, "Added task");
        self.persist();
        Ok(task)
    }

    /// Apply a partial update
    ///
    /// Returns `Ok(None)` when no task has this id.
    pub fn update(&mut self, id: &str, patch: TaskPatch) -> Result<Option<Task>> {
        let title = match patch.title {
            Some(title) => {
                let title = title.trim();
                if title.is_empty() {
                    return Err(eyre!("Task title cannot be empty"));
                }
                Some(title.to_string())
            }
            None => None,
        };

        let now = self.clock.now();
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!(id, "update: no such task");
            return Ok(None);
        };

        if let Some(title) = title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = description.trim().to_string();
        }
        if let Some(subject) = patch.subject {
            task.subject = subject.trim().to_string();
        }
        if let Some(due) = patch.due {
            task.due = due;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(color) = patch.color {
            task.color = color;
        }
        if let Some(completed) = patch.completed {
            task.set_completed(completed, now);
        }
        task.updated_at = now.max(task.created_at);

        let updated = task.clone();
        info!(id, "Updated task");
        self.persist();
        Ok(Some(updated))
    }

    /// Flip the completion flag
    pub fn toggle(&mut self, id: &str) -> Option<Task> {
        let now = self.clock.now();
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!(id, "toggle: no such task");
            return None;
        };

        let completed = !task.completed;
        task.set_completed(completed, now);
        task.updated_at = now.max(task.created_at);

        let toggled = task.clone();
        info!(id, completed, "Toggled task");
        self.persist();
        Some(toggled)
    }

    /// Remove a task, returning whether it existed
    pub fn delete(&mut self, id: &str) -> bool {
        let Some(index) = self.tasks.iter().position(|t| t.id == id) else {
            debug!(id, "delete: no such task");
            return false;
        };

        self.tasks.remove(index);
        info!(id, "Deleted task");
        self.persist();
        true
    }

    /// Remove every completed task, returning how many went
    pub fn clear_completed(&mut self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| !t.completed);
        let removed = before - self.tasks.len();

        if removed > 0 {
            info!(count = removed, "Cleared completed tasks");
            self.persist();
        }
        removed
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn statistics(&self) -> Statistics {
        let now = self.clock.local_now();
        let mut stats = Statistics {
            total: self.tasks.len(),
            ..Statistics::default()
        };

        for task in &self.tasks {
            if task.completed {
                stats.completed += 1;
            }
            match DueStatus::classify(task, now) {
                DueStatus::Overdue => stats.overdue += 1,
                DueStatus::DueSoon => stats.due_soon += 1,
                DueStatus::None => {}
            }
        }
        stats.active = stats.total - stats.completed;
        stats
    }

    /// Filter, then search, then sort; the stored list is left untouched
    pub fn query(&self, filter: Filter, sort: SortKey, search: &str) -> Vec<Task> {
        self.run(&Query::new(filter, sort, search))
    }

    pub fn run(&self, query: &Query) -> Vec<Task> {
        query.run(&self.tasks, self.clock.local_now())
    }

    /// Deadline badge for one task, as of now
    pub fn due_status(&self, task: &Task) -> DueStatus {
        DueStatus::classify(task, self.clock.local_now())
    }

    // ========================================================================
    // Export / import
    // ========================================================================

    pub fn export(&self) -> ExportBundle {
        ExportBundle {
            tasks: self.tasks.clone(),
            exported_at: self.clock.now(),
            version: EXPORT_VERSION.to_string(),
        }
    }

    /// Import from JSON text: an export bundle or a bare array of tasks
    ///
    /// Returns how many tasks were added; malformed input adds none.
    pub fn import_json(&mut self, payload: &str) -> usize {
        let values = match serde_json::from_str::<ImportPayload>(payload) {
            Ok(ImportPayload::Bundle { tasks }) | Ok(ImportPayload::Bare(tasks)) => tasks,
            Err(e) => {
                warn!(error = %e, "Import payload is not a task list");
                return 0;
            }
        };

        let records = values
            .into_iter()
            .enumerate()
            .filter_map(|(i, value)| match serde_json::from_value::<ImportRecord>(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(index = i, error = %e, "Skipping malformed import record");
                    None
                }
            })
            .collect();

        self.import(records)
    }

    /// Prepend imported records as new tasks with fresh ids
    pub fn import(&mut self, records: Vec<ImportRecord>) -> usize {
        let now = self.clock.now();
        let mut imported: Vec<Task> = Vec::with_capacity(records.len());

        for (i, record) in records.into_iter().enumerate() {
            let title = record.title.trim();
            if title.is_empty() {
                warn!(index = i, "Skipping import record without a title");
                continue;
            }

            let created_at = record.created_at.unwrap_or(now);
            let completed_at = if record.completed {
                Some(record.completed_at.unwrap_or(now))
            } else {
                None
            };
            let task = Task {
                id: self.fresh_id(&imported),
                title: title.to_string(),
                description: record.description.trim().to_string(),
                subject: record.subject.trim().to_string(),
                due: record.due,
                priority: record.priority,
                color: record.color.unwrap_or_else(random_color),
                completed: record.completed,
                created_at,
                updated_at: now.max(created_at),
                completed_at,
            };
            imported.push(task);
        }

        let count = imported.len();
        if count > 0 {
            self.tasks.splice(0..0, imported);
            info!(count, "Imported tasks");
            self.persist();
        }
        count
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportPayload {
    Bundle { tasks: Vec<serde_json::Value> },
    Bare(Vec<serde_json::Value>),
}

/// Repair what older or hand-edited payloads can get wrong
///
/// Duplicate ids keep the most recently updated copy in the first copy's
/// position, and `completed_at` is brought in line with `completed`.
fn normalize_loaded(tasks: Vec<Task>) -> Vec<Task> {
    let mut out: Vec<Task> = Vec::with_capacity(tasks.len());
    let mut seen: HashMap<String, usize> = HashMap::new();

    for mut task in tasks {
        match (task.completed, task.completed_at) {
            (true, None) => task.completed_at = Some(task.updated_at),
            (false, Some(_)) => task.completed_at = None,
            _ => {}
        }

        match seen.get(&task.id) {
            Some(&index) => {
                warn!(id = %task.id, "Duplicate task id in storage");
                if task.updated_at > out[index].updated_at {
                    out[index] = task;
                }
            }
            None => {
                seen.insert(task.id.clone(), out.len());
                out.push(task);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::Priority;
    use crate::storage::MemoryStorage;
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_store() -> (TaskStore<MemoryStorage, ManualClock>, MemoryStorage, ManualClock) {
        let storage = MemoryStorage::new();
        let clock = ManualClock::new(at(2024, 1, 8, 9));
        let store = TaskStore::with_clock(storage.clone(), clock.clone());
        (store, storage, clock)
    }

    /// Memory storage whose writes can be switched off
    #[derive(Clone, Default)]
    struct FlakyStorage {
        inner: MemoryStorage,
        failing: Arc<AtomicBool>,
    }

    impl Storage for FlakyStorage {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(eyre!("quota exceeded"));
            }
            self.inner.set(key, value)
        }

        fn remove(&mut self, key: &str) -> Result<()> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_add_assigns_fields() {
        let (mut store, _, clock) = new_store();

        let task = store
            .add(NewTask::new("  Math HW  ").subject(" Math ").priority(Priority::Hard))
            .unwrap();

        assert_eq!(task.title, "Math HW");
        assert_eq!(task.subject, "Math");
        assert_eq!(task.description, "");
        assert_eq!(task.priority, Priority::Hard);
        assert!(!task.completed);
        assert_eq!(task.completed_at, None);
        assert_eq!(task.created_at, clock.now());
        assert_eq!(task.updated_at, clock.now());
        assert!(crate::models::PALETTE.contains(&task.color.as_str()));
    }

    #[test]
    fn test_add_rejects_blank_title() {
        let (mut store, _, _) = new_store();
        assert!(store.add(NewTask::new("   ")).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_add_inserts_at_front() {
        let (mut store, _, _) = new_store();
        let a = store.add(NewTask::new("A")).unwrap();
        let b = store.add(NewTask::new("B")).unwrap();

        let all = store.all();
        assert_eq!(all[0].id, b.id);
        assert_eq!(all[1].id, a.id);
    }

    #[test]
    fn test_ids_are_unique() {
        let (mut store, _, _) = new_store();
        for i in 0..200 {
            store.add(NewTask::new(format!("Task {}", i))).unwrap();
        }
        let ids: HashSet<String> = store.all().into_iter().map(|t| t.id).collect();
        assert_eq!(ids.len(), 200);
    }

    #[test]
    fn test_update_merges_patch() {
        let (mut store, _, clock) = new_store();
        let task = store.add(NewTask::new("Essay").due(date(2024, 1, 12))).unwrap();

        clock.advance(Duration::minutes(5));
        let patch = TaskPatch {
            description: Some("500 words".to_string()),
            due: Some(None),
            priority: Some(Priority::Easy),
            ..TaskPatch::default()
        };
        let updated = store.update(&task.id, patch).unwrap().unwrap();

        assert_eq!(updated.title, "Essay");
        assert_eq!(updated.description, "500 words");
        assert_eq!(updated.due, None);
        assert_eq!(updated.priority, Priority::Easy);
        assert_eq!(updated.created_at, task.created_at);
        assert_eq!(updated.updated_at, task.created_at + Duration::minutes(5));
        assert_eq!(store.get(&task.id).unwrap(), updated);
    }

    #[test]
    fn test_update_unknown_id_is_none() {
        let (mut store, _, _) = new_store();
        let result = store.update("missing", TaskPatch::default()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_update_blank_title_changes_nothing() {
        let (mut store, _, _) = new_store();
        let task = store.add(NewTask::new("Keep me")).unwrap();
        let patch = TaskPatch {
            title: Some("  ".to_string()),
            ..TaskPatch::default()
        };
        assert!(store.update(&task.id, patch).is_err());
        assert_eq!(store.get(&task.id).unwrap().title, "Keep me");
    }

    #[test]
    fn test_update_completed_keeps_completed_at_in_step() {
        let (mut store, _, _) = new_store();
        let task = store.add(NewTask::new("Read")).unwrap();

        let patch = TaskPatch {
            completed: Some(true),
            ..TaskPatch::default()
        };
        let done = store.update(&task.id, patch).unwrap().unwrap();
        assert!(done.completed);
        assert!(done.completed_at.is_some());

        let patch = TaskPatch {
            completed: Some(false),
            ..TaskPatch::default()
        };
        let undone = store.update(&task.id, patch).unwrap().unwrap();
        assert!(!undone.completed);
        assert_eq!(undone.completed_at, None);
    }

    #[test]
    fn test_toggle_twice_restores_state() {
        let (mut store, _, clock) = new_store();
        let task = store.add(NewTask::new("Lab report")).unwrap();

        clock.advance(Duration::hours(1));
        let done = store.toggle(&task.id).unwrap();
        assert!(done.completed);
        assert_eq!(done.completed_at, Some(clock.now()));
        assert_eq!(done.updated_at, clock.now());

        clock.advance(Duration::hours(1));
        let undone = store.toggle(&task.id).unwrap();
        assert!(!undone.completed);
        assert_eq!(undone.completed_at, None);
        assert_eq!(undone.updated_at, clock.now());
    }

    #[test]
    fn test_toggle_unknown_id() {
        let (mut store, _, _) = new_store();
        assert!(store.toggle("missing").is_none());
    }

    #[test]
    fn test_delete() {
        let (mut store, _, _) = new_store();
        let task = store.add(NewTask::new("Gone soon")).unwrap();

        assert!(store.delete(&task.id));
        assert!(!store.delete(&task.id));
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_completed() {
        let (mut store, _, _) = new_store();
        let ids: Vec<String> = (0..5)
            .map(|i| store.add(NewTask::new(format!("Task {}", i))).unwrap().id)
            .collect();
        store.toggle(&ids[1]);
        store.toggle(&ids[3]);

        assert_eq!(store.clear_completed(), 2);
        assert_eq!(store.len(), 3);
        assert!(store.all().iter().all(|t| !t.completed));
        assert_eq!(store.clear_completed(), 0);
    }

    #[test]
    fn test_statistics() {
        let (mut store, _, clock) = new_store();
        clock.set(at(2024, 1, 8, 12));

        store.add(NewTask::new("Soon").due(date(2024, 1, 9))).unwrap();
        store.add(NewTask::new("Late").due(date(2024, 1, 2))).unwrap();
        store.add(NewTask::new("Far").due(date(2024, 2, 1))).unwrap();
        store.add(NewTask::new("Undated")).unwrap();
        let done = store.add(NewTask::new("Done late").due(date(2024, 1, 1))).unwrap();
        store.toggle(&done.id);

        let stats = store.statistics();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.active, 4);
        assert_eq!(stats.due_soon, 1);
        assert_eq!(stats.overdue, 1);
        assert_eq!(stats.total, stats.completed + stats.active);
    }

    #[test]
    fn test_due_status_follows_clock() {
        let (mut store, _, clock) = new_store();
        let task = store.add(NewTask::new("Quiz").due(date(2024, 1, 9))).unwrap();

        clock.set(at(2024, 1, 8, 12));
        assert_eq!(store.due_status(&task), DueStatus::DueSoon);

        clock.set(at(2024, 1, 10, 12));
        assert_eq!(store.due_status(&task), DueStatus::Overdue);
    }

    #[test]
    fn test_due_days_follow_clock_offset() {
        // 20:00 UTC on the 8th is 03:00 on the 9th at UTC+7
        let plus7 = chrono::FixedOffset::east_opt(7 * 3600).unwrap();
        let clock = ManualClock::new(at(2024, 1, 8, 20)).with_offset(plus7);
        let mut store = TaskStore::with_clock(MemoryStorage::new(), clock);
        let task = store.add(NewTask::new("Essay").due(date(2024, 1, 8))).unwrap();

        assert_eq!(store.due_status(&task), DueStatus::Overdue);
        assert_eq!(store.statistics().overdue, 1);
        assert_eq!(store.query(Filter::Overdue, SortKey::Created, "").len(), 1);
    }

    #[test]
    fn test_query_sort_by_due() {
        let (mut store, _, _) = new_store();
        let a = store
            .add(
                NewTask::new("Math HW")
                    .subject("Math")
                    .due(date(2024, 1, 10))
                    .priority(Priority::Hard),
            )
            .unwrap();
        let b = store
            .add(
                NewTask::new("Art")
                    .subject("Art")
                    .due(date(2024, 1, 5))
                    .priority(Priority::Easy),
            )
            .unwrap();

        let out = store.query(Filter::All, SortKey::Due, "");
        let ids: Vec<&str> = out.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec![b.id.as_str(), a.id.as_str()]);
    }

    #[test]
    fn test_query_search_matches_subject() {
        let (mut store, _, _) = new_store();
        store.add(NewTask::new("Homework").subject("Math")).unwrap();
        store.add(NewTask::new("Painting").subject("Art")).unwrap();

        let out = store.query(Filter::All, SortKey::Created, "math");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Homework");
    }

    #[test]
    fn test_query_all_created_is_newest_first() {
        let (mut store, _, clock) = new_store();
        for i in 0..4 {
            clock.advance(Duration::minutes(1));
            store.add(NewTask::new(format!("Task {}", i))).unwrap();
        }

        let out = store.query(Filter::All, SortKey::Created, "");
        assert_eq!(out.len(), 4);
        assert!(out.windows(2).all(|w| w[0].created_at > w[1].created_at));
    }

    #[test]
    fn test_query_does_not_reorder_store() {
        let (mut store, _, _) = new_store();
        store.add(NewTask::new("b")).unwrap();
        store.add(NewTask::new("a")).unwrap();
        store.add(NewTask::new("c")).unwrap();
        let before = store.all();

        let _ = store.query(Filter::All, SortKey::Title, "");
        assert_eq!(store.all(), before);
    }

    #[test]
    fn test_reload_roundtrip() {
        let (mut store, storage, clock) = new_store();
        let a = store.add(NewTask::new("One").due(date(2024, 3, 1))).unwrap();
        store.add(NewTask::new("Two").description("details")).unwrap();
        store.toggle(&a.id);

        let reopened = TaskStore::with_clock(storage, clock);
        assert_eq!(reopened.all(), store.all());
    }

    #[test]
    fn test_load_corrupt_payload_is_empty() {
        let mut storage = MemoryStorage::new();
        storage.set(DEFAULT_STORAGE_KEY, "{not json").unwrap();

        let store = TaskStore::new(storage);
        assert!(store.is_empty());
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_load_skips_malformed_records_and_keeps_the_rest() {
        let mut storage = MemoryStorage::new();
        storage
            .set(
                DEFAULT_STORAGE_KEY,
                r#"[
                {"id":"a","title":"Keep A","created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z"},
                {"id":"bad","title":"Broken","description":null,"created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z"},
                {"id":7,"title":"Numeric id","created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z"},
                {"id":"b","title":"Keep B","created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z"}
            ]"#,
            )
            .unwrap();

        let mut store = TaskStore::with_clock(storage.clone(), ManualClock::new(at(2024, 1, 8, 9)));
        let titles: Vec<String> = store.all().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["Keep A", "Keep B"]);

        // The next save writes the surviving tasks back, not an empty list
        store.add(NewTask::new("New")).unwrap();
        let reopened = TaskStore::new(storage);
        let titles: Vec<String> = reopened.all().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["New", "Keep A", "Keep B"]);
    }

    #[test]
    fn test_load_non_array_payload_is_empty() {
        let mut storage = MemoryStorage::new();
        storage.set(DEFAULT_STORAGE_KEY, r#"{"tasks": []}"#).unwrap();
        assert!(TaskStore::new(storage).is_empty());
    }

    #[test]
    fn test_load_repairs_duplicates_and_completed_at() {
        let mut storage = MemoryStorage::new();
        storage
            .set(
                DEFAULT_STORAGE_KEY,
                r#"[
                {"id":"1","title":"Old copy","completed":false,"created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z"},
                {"id":"2","title":"Done","completed":true,"created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-03T00:00:00Z"},
                {"id":"1","title":"New copy","completed":false,"created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-02T00:00:00Z"}
            ]"#,
            )
            .unwrap();

        let store = TaskStore::new(storage);
        let all = store.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "New copy");
        assert_eq!(all[1].completed_at, Some(at(2024, 1, 3, 0)));
    }

    #[test]
    fn test_failed_save_keeps_memory_and_retries() {
        let storage = FlakyStorage::default();
        let failing = storage.failing.clone();
        let mut store = TaskStore::new(storage.clone());

        failing.store(true, Ordering::SeqCst);
        let task = store.add(NewTask::new("Unsaved")).unwrap();
        assert!(store.is_dirty());
        assert_eq!(store.len(), 1);
        assert!(store.flush().is_err());

        failing.store(false, Ordering::SeqCst);
        store.toggle(&task.id).unwrap();
        assert!(!store.is_dirty());

        let reopened = TaskStore::new(storage);
        assert_eq!(reopened.len(), 1);
        assert!(reopened.get(&task.id).unwrap().completed);
    }

    #[test]
    fn test_export_bundle() {
        let (mut store, _, clock) = new_store();
        store.add(NewTask::new("Backup me")).unwrap();

        let bundle = store.export();
        assert_eq!(bundle.tasks, store.all());
        assert_eq!(bundle.version, "1.0");
        assert_eq!(bundle.exported_at, clock.now());
    }

    #[test]
    fn test_import_assigns_fresh_ids_and_prepends() {
        let (mut store, _, clock) = new_store();
        let existing = store.add(NewTask::new("Existing")).unwrap();
        let bundle = serde_json::to_string(&store.export()).unwrap();

        clock.advance(Duration::hours(2));
        assert_eq!(store.import_json(&bundle), 1);

        let all = store.all();
        assert_eq!(all.len(), 2);
        assert_ne!(all[0].id, existing.id);
        assert_eq!(all[0].title, "Existing");
        assert_eq!(all[0].created_at, existing.created_at);
        assert_eq!(all[0].updated_at, clock.now());
        assert_eq!(all[1].id, existing.id);
    }

    #[test]
    fn test_import_bare_array_defaults() {
        let (mut store, _, clock) = new_store();
        let payload = r#"[
            {"title": "Chem", "subject": "Science", "due": "2024-01-20", "priority": "hard"},
            {"title": "Finished", "completed": true},
            {"title": "   "},
            {"title": 42}
        ]"#;

        assert_eq!(store.import_json(payload), 2);

        let all = store.all();
        assert_eq!(all[0].title, "Chem");
        assert_eq!(all[0].due, Some(date(2024, 1, 20)));
        assert_eq!(all[0].created_at, clock.now());
        assert!(all[1].completed);
        assert_eq!(all[1].completed_at, Some(clock.now()));
    }

    #[test]
    fn test_import_malformed_payload() {
        let (mut store, _, _) = new_store();
        assert_eq!(store.import_json("not json"), 0);
        assert_eq!(store.import_json(r#"{"items": []}"#), 0);
        assert_eq!(store.import_json("[]"), 0);
        assert!(store.is_empty());
    }
}
