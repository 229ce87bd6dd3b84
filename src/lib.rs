// todolist - Personal task tracker with a local JSON store and due-date aware queries

pub mod clock;
pub mod config;
pub mod filter;
pub mod models;
pub mod query;
pub mod storage;
pub mod store;

// Re-export main types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Backend, Config};
pub use filter::{DueStatus, Filter};
pub use models::{ExportBundle, ImportRecord, NewTask, Priority, Statistics, Task, TaskPatch};
pub use query::{Query, SortKey};
pub use storage::{FileStorage, MemoryStorage, SqliteStorage, Storage};
pub use store::TaskStore;
