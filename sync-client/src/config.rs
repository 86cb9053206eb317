//! Configuration loading for tablesync.
//!
//! Configuration is loaded from a TOML file (default: `tablesync.toml` in
//! the platform config directory). Every section and field is optional.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tablesync_core::RetryPolicy;

/// Root configuration for tablesync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// Remote stream configuration.
    #[serde(default)]
    pub stream: StreamConfig,
    /// Retry configuration.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Notification configuration.
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Remote stream configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamConfig {
    /// Path of the keyed collection (default: `tables`).
    #[serde(default = "default_path")]
    pub path: String,
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryConfig {
    /// Retries before giving up (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Upper bound of a single backoff delay in milliseconds (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Ceiling of the backoff exponent (default: 4).
    #[serde(default = "default_exponent_cap")]
    pub exponent_cap: u32,
}

/// Notification configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NotificationConfig {
    /// Platform channel alerts are posted on.
    #[serde(default = "default_channel_id")]
    pub channel_id: String,
    /// Alert title.
    #[serde(default = "default_title")]
    pub title: String,
}

// Default value functions
fn default_path() -> String {
    "tables".to_string()
}

fn default_max_attempts() -> u32 {
    tablesync_core::retry::DEFAULT_MAX_ATTEMPTS
}

fn default_max_delay_ms() -> u64 {
    tablesync_core::retry::DEFAULT_MAX_DELAY.as_millis() as u64
}

fn default_exponent_cap() -> u32 {
    tablesync_core::retry::DEFAULT_EXPONENT_CAP
}

fn default_channel_id() -> String {
    "TABLE_STATUS_UPDATES_CHANNEL".to_string()
}

fn default_title() -> String {
    "Table Alert!".to_string()
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_delay_ms: default_max_delay_ms(),
            exponent_cap: default_exponent_cap(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_id: default_channel_id(),
            title: default_title(),
        }
    }
}

impl RetryConfig {
    /// Retry policy described by this section.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            max_delay: Duration::from_millis(self.max_delay_ms),
            exponent_cap: self.exponent_cap,
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_toml(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
