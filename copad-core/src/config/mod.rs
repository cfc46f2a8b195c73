//! Configuration management for Copad
//!
//! Environment-based configuration with defaults, TOML file loading, and
//! validation. Every tunable the sync engine consults lives here so tests
//! and embedders can shrink the timing knobs without touching engine code.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Sync engine tunables
    pub sync: SyncConfig,

    /// Local backup configuration
    pub backup: BackupConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Sync engine tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Quiet period before a burst of local edits is persisted
    #[serde(with = "humantime_serde")]
    pub debounce_quiet: Duration,

    /// Base delay before cursor restoration after a programmatic replace.
    /// The hosting surface commits new text runs asynchronously, so the
    /// restore walk must run slightly after the replacement.
    #[serde(with = "humantime_serde")]
    pub cursor_restore_delay: Duration,

    /// Content length (in bytes) above which the restore delay is doubled
    pub large_document_threshold: usize,
}

/// Local backup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Write a local fallback copy on every successful save
    pub enabled: bool,

    /// Directory for file-backed backups
    pub data_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_quiet: Duration::from_millis(750),
            cursor_restore_delay: Duration::from_millis(30),
            large_document_threshold: 64 * 1024,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_target: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: COPAD_<SECTION>_<KEY>
    /// Example: COPAD_SYNC_DEBOUNCE_QUIET=500ms
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(quiet) = env::var("COPAD_SYNC_DEBOUNCE_QUIET") {
            config.sync.debounce_quiet = humantime::parse_duration(&quiet)
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid quiet period: {}", e)))?;
        }
        if let Ok(delay) = env::var("COPAD_SYNC_CURSOR_RESTORE_DELAY") {
            config.sync.cursor_restore_delay = humantime::parse_duration(&delay)
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid restore delay: {}", e)))?;
        }

        if let Ok(enabled) = env::var("COPAD_BACKUP_ENABLED") {
            config.backup.enabled = enabled
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid backup flag: {}", e)))?;
        }
        if let Ok(data_dir) = env::var("COPAD_BACKUP_DATA_DIR") {
            config.backup.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(level) = env::var("COPAD_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(json) = env::var("COPAD_LOG_JSON") {
            config.logging.json_format = json
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid JSON flag: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.debounce_quiet.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "debounce_quiet must be greater than zero".to_string(),
            ));
        }

        if self.sync.large_document_threshold == 0 {
            return Err(ConfigError::ValidationFailed(
                "large_document_threshold must be greater than zero".to_string(),
            ));
        }

        if self.logging.level.parse::<crate::logging::LogLevel>().is_err() {
            return Err(ConfigError::ValidationFailed(format!(
                "unknown log level '{}'",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Delay before restoring the cursor after a replacement of `content_len`
    /// bytes. Large documents get extra time for the surface to commit.
    pub fn restore_delay_for(&self, content_len: usize) -> Duration {
        if content_len > self.sync.large_document_threshold {
            self.sync.cursor_restore_delay * 2
        } else {
            self.sync.cursor_restore_delay
        }
    }
}
