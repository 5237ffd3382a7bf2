//! Runtime settings.
//!
//! Settings are loaded from environment variables with fallback to defaults.
//!
//! | Variable                          | Default            |
//! |-----------------------------------|--------------------|
//! | `UPLIFT_DATABASE_PATH`            | `./uplift_dev.db`  |
//! | `UPLIFT_MAX_CONNECTIONS`          | `5`                |
//! | `UPLIFT_BUSY_TIMEOUT_MS`          | `5000`             |
//! | `UPLIFT_UNIT_OF_WORK_TIMEOUT_MS`  | `10000`            |

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::pool::DbConfig;

pub const DEFAULT_DATABASE_PATH: &str = "./uplift_dev.db";

/// Settings for one process hosting the uplift core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Pool size
    pub max_connections: u32,

    /// How long a connection waits on SQLite's write lock
    pub busy_timeout_ms: u64,

    /// Upper bound on one sale / void / bulk unit of work
    pub unit_of_work_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            max_connections: 5,
            busy_timeout_ms: 5_000,
            unit_of_work_timeout_ms: 10_000,
        }
    }
}

impl Settings {
    /// Load settings from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();

        let settings = Settings {
            database_path: lookup("UPLIFT_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),

            max_connections: parse_or(&lookup, "UPLIFT_MAX_CONNECTIONS", defaults.max_connections)?,

            busy_timeout_ms: parse_or(&lookup, "UPLIFT_BUSY_TIMEOUT_MS", defaults.busy_timeout_ms)?,

            unit_of_work_timeout_ms: parse_or(
                &lookup,
                "UPLIFT_UNIT_OF_WORK_TIMEOUT_MS",
                defaults.unit_of_work_timeout_ms,
            )?,
        };

        if settings.max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "UPLIFT_MAX_CONNECTIONS".to_string(),
            ));
        }

        if settings.unit_of_work_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "UPLIFT_UNIT_OF_WORK_TIMEOUT_MS".to_string(),
            ));
        }

        Ok(settings)
    }

    /// Pool configuration for these settings.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path.clone())
            .max_connections(self.max_connections)
            .busy_timeout(Duration::from_millis(self.busy_timeout_ms))
            .unit_of_work_timeout(Duration::from_millis(self.unit_of_work_timeout_ms))
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}
