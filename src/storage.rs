// Keyed blob persistence: file, SQLite and in-memory backends

use eyre::{Context, Result, eyre};
use fs2::FileExt;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Where the task list lives unless configured otherwise
pub const DEFAULT_STORAGE_KEY: &str = "todolist_tasks";

/// A string-keyed store of string blobs
pub trait Storage {
    /// Read the blob under `key`, `None` if it was never written
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the blob under `key`
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    fn remove(&mut self, key: &str) -> Result<()>;
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(eyre!("Storage key cannot be empty"));
    }
    if key.len() > 64 {
        return Err(eyre!("Storage key too long: {} (max 64 chars)", key));
    }
    if !key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(eyre!("Invalid storage key: {} (must be alphanumeric with _/-)", key));
    }
    Ok(())
}

// ============================================================================
// File backend
// ============================================================================

/// One `{key}.json` file per key inside a directory
///
/// Writers hold an exclusive lock on `{key}.lock` and replace the blob with a
/// rename, so a reader never sees a half-written file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open or create a storage directory
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).context("Failed to create storage directory")?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn blob_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn lock_file(&self, key: &str) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.dir.join(format!("{}.lock", key)))
            .context("Failed to open lock file")
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        let path = self.blob_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let lock = self.lock_file(key)?;
        FileExt::lock_shared(&lock).context("Failed to acquire shared lock")?;
        let content = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        debug!(file = ?path, bytes = content.len(), "Read blob");

        // Lock is released when `lock` is dropped
        Ok(Some(content))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        let path = self.blob_path(key);
        let tmp_path = self.dir.join(format!("{}.json.tmp", key));

        let lock = self.lock_file(key)?;
        FileExt::lock_exclusive(&lock).context("Failed to acquire file lock")?;

        let mut tmp = File::create(&tmp_path).context("Failed to create temp file")?;
        tmp.write_all(value.as_bytes())?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, &path).with_context(|| format!("Failed to replace {}", path.display()))?;
        debug!(file = ?path, bytes = value.len(), "Wrote blob");

        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        validate_key(key)?;
        let path = self.blob_path(key);

        let lock = self.lock_file(key)?;
        FileExt::lock_exclusive(&lock).context("Failed to acquire file lock")?;
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Ok(())
    }
}

// ============================================================================
// SQLite backend
// ============================================================================

/// Key/value table in a SQLite database
pub struct SqliteStorage {
    db: Connection,
}

impl SqliteStorage {
    /// Open or create a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
        let db = Connection::open(path.as_ref()).context("Failed to open SQLite database")?;
        Self::with_connection(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        Self::with_connection(db)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        let storage = Self { db };
        storage.create_schema()?;
        Ok(storage)
    }

    /// Get a reference to the SQLite database connection
    pub fn db(&self) -> &Connection {
        &self.db
    }

    fn create_schema(&self) -> Result<()> {
        debug!("Creating kv schema");

        self.db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(())
    }
}

impl Storage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        let value = self
            .db
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get::<_, String>(0))
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        self.db.execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![key, value, chrono::Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.db.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(())
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Process-local storage; clones see the same data
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(|_| eyre!("Memory storage lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| eyre!("Memory storage lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| eyre!("Memory storage lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}
