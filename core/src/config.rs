//! Engine configuration

use crate::error::{FlatError, FlatResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the table files
    pub data_dir: String,
    /// Age after which a lock token is considered abandoned
    pub lock_timeout_ms: u64,
    pub max_column_name_length: usize,
    pub max_table_name_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "./flatdb_data".to_string(),
            lock_timeout_ms: 60_000,
            max_column_name_length: 30,
            max_table_name_length: 30,
        }
    }
}

impl Config {
    /// Load config from a TOML file, with environment variable overrides.
    /// Falls back to defaults if the file is not found. FLATDB_CONFIG overrides the path.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> FlatResult<Self> {
        let path = env::var("FLATDB_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        let mut cfg = match fs::read_to_string(&path) {
            Ok(s) => Self::from_toml(&s)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(FlatError::Io(e)),
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn from_toml(s: &str) -> FlatResult<Self> {
        toml::from_str(s).map_err(|e| FlatError::Config(e.to_string()))
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Apply FLATDB_* environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("FLATDB_DATA_DIR") {
            self.data_dir = v;
        }

        if let Ok(v) = env::var("FLATDB_LOCK_TIMEOUT_MS")
            && let Ok(ms) = v.parse::<u64>()
        {
            self.lock_timeout_ms = ms;
        }
    }
}
