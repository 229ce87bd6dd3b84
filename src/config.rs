// CLI configuration loaded from YAML

use crate::storage::{DEFAULT_STORAGE_KEY, FileStorage, SqliteStorage, Storage};
use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_DIR: &str = "todolist";
const CONFIG_FILE: &str = "config.yaml";
const SQLITE_FILE: &str = "todolist.db";

/// Which storage backend holds the task list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    File,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub backend: Backend,
    pub data_dir: PathBuf,
    pub storage_key: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::File,
            data_dir: default_data_dir(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// `$XDG_DATA_HOME/todolist` or the platform equivalent
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// `$XDG_CONFIG_HOME/todolist/config.yaml` or the platform equivalent
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

impl Config {
    /// Load from `path`, or from the default location when `None`
    ///
    /// A missing file at the default location yields the defaults; a missing
    /// file that was asked for explicitly is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => {
                    debug!("No config file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_yaml(&content).with_context(|| format!("Invalid config {}", path.display()))?;
        debug!(file = ?path, "Loaded config");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        crate::storage::validate_key(&self.storage_key)?;
        if self.data_dir.as_os_str().is_empty() {
            return Err(eyre!("data_dir cannot be empty"));
        }
        Ok(())
    }

    /// Open the configured backend
    pub fn open_storage(&self) -> Result<Box<dyn Storage>> {
        let storage: Box<dyn Storage> = match self.backend {
            Backend::File => Box::new(FileStorage::open(&self.data_dir)?),
            Backend::Sqlite => Box::new(SqliteStorage::open(self.data_dir.join(SQLITE_FILE))?),
        };
        debug!(backend = ?self.backend, dir = ?self.data_dir, "Opened storage");
        Ok(storage)
    }
}
