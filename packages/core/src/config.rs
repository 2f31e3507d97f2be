/// Configuration for the tree store
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable overriding the database file location
pub const DB_PATH_ENV: &str = "SAVERESTORE_DB_PATH";

/// Environment variable overriding the busy timeout (milliseconds)
pub const BUSY_TIMEOUT_ENV: &str = "SAVERESTORE_BUSY_TIMEOUT_MS";

/// Configuration for opening a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the database file
    pub database_path: PathBuf,

    /// How long a connection waits on a locked database before failing
    pub busy_timeout_ms: u64,

    /// Enable write-ahead logging on open
    pub wal_mode: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/saverestore.db"),
            busy_timeout_ms: 5000,
            wal_mode: true,
        }
    }
}

impl StoreConfig {
    /// Defaults overlaid with `SAVERESTORE_DB_PATH` / `SAVERESTORE_BUSY_TIMEOUT_MS`.
    ///
    /// Unparseable timeout values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(path) = lookup(DB_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            config.database_path = PathBuf::from(path);
        }
        if let Some(timeout) = lookup(BUSY_TIMEOUT_ENV).and_then(|t| t.trim().parse().ok()) {
            config.busy_timeout_ms = timeout;
        }
        config
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.database_path.as_os_str().is_empty() {
            return Err("database_path cannot be empty".to_string());
        }

        if self.busy_timeout_ms == 0 {
            return Err("busy_timeout_ms must be greater than 0".to_string());
        }

        Ok(())
    }
}
