//! Store configuration
//!
//! Every knob has a sensible default; the environment overrides are for
//! hosts that relocate the database directory or tune timeouts.

use std::time::Duration;

/// Configuration for a project store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Name of the project-local database directory.
    pub db_dir: String,
    /// Database file name inside `db_dir`.
    pub db_file: String,
    /// SQLite busy timeout.
    pub busy_timeout: Duration,
    /// Default reservation TTL when the caller does not pass one.
    pub default_ttl_seconds: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_dir: ".hive".to_string(),
            db_file: "hive-mail.db3".to_string(),
            busy_timeout: Duration::from_millis(5_000),
            default_ttl_seconds: 3_600,
        }
    }
}

impl StoreConfig {
    /// Build a config from the environment, falling back to defaults.
    ///
    /// Recognized variables: `HIVE_MAIL_DB_DIR`, `HIVE_MAIL_DB_FILE`,
    /// `HIVE_MAIL_BUSY_TIMEOUT_MS`, `HIVE_MAIL_DEFAULT_TTL_SECONDS`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("HIVE_MAIL_DB_DIR") {
            if !dir.trim().is_empty() {
                config.db_dir = dir;
            }
        }
        if let Ok(file) = std::env::var("HIVE_MAIL_DB_FILE") {
            if !file.trim().is_empty() {
                config.db_file = file;
            }
        }
        if let Ok(ms) = std::env::var("HIVE_MAIL_BUSY_TIMEOUT_MS") {
            if let Ok(ms) = ms.trim().parse::<u64>() {
                config.busy_timeout = Duration::from_millis(ms);
            }
        }
        if let Ok(ttl) = std::env::var("HIVE_MAIL_DEFAULT_TTL_SECONDS") {
            if let Ok(ttl) = ttl.trim().parse::<i64>() {
                if ttl > 0 {
                    config.default_ttl_seconds = ttl;
                }
            }
        }
        config
    }
}
