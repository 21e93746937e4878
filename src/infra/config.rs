//! Centralized configuration (environment variables + defaults).
//!
//! A `.env` file in the working directory is honored by [`load_dotenv`].

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_FILE: &str = "rowkeeper.db";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Loads `.env` once; missing files are fine.
pub fn load_dotenv() {
    dotenv::dotenv().ok();
}

/// Directory holding the database file (`ROWKEEPER_DB_DIR`, default: current dir).
pub fn database_dir() -> PathBuf {
    std::env::var("ROWKEEPER_DB_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Database file name inside [`database_dir`] (`ROWKEEPER_DB_FILE`).
pub fn database_file() -> String {
    std::env::var("ROWKEEPER_DB_FILE")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DB_FILE.to_string())
}

/// How long SQLite waits on a locked database (`ROWKEEPER_BUSY_TIMEOUT_MS`).
pub fn busy_timeout() -> Duration {
    let ms = std::env::var("ROWKEEPER_BUSY_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_BUSY_TIMEOUT_MS);
    Duration::from_millis(ms)
}

/// Everything the storage handle needs to open its connection.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub dir: PathBuf,
    pub file_name: String,
    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        Self {
            dir: database_dir(),
            file_name: database_file(),
            busy_timeout: busy_timeout(),
        }
    }

    /// Default file name and timeout, explicit directory.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file_name: DEFAULT_DB_FILE.to_string(),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}
