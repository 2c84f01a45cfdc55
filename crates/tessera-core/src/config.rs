//! `Tessera` Configuration Module
//!
//! Provides configuration file support via `tessera.toml`, environment variables,
//! and defaults.
//!
//! # Priority (highest to lowest)
//!
//! 1. Environment variables (`TESSERA_*`)
//! 2. Configuration file (`tessera.toml`)
//! 3. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration file.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },
}

/// Alter job configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlterConfig {
    /// Maximum in-memory layout width of one row of an index, in bytes.
    pub max_layout_length_per_row: usize,
    /// Deadline of a schema change job, counted from its creation.
    pub alter_table_timeout_secs: u64,
    /// How long a finished job keeps the old schema hash resolvable.
    pub alter_delete_base_delay_secs: u64,
    /// Interval between two scheduler ticks.
    pub scheduler_interval_ms: u64,
    /// False-positive probability used when bloom filter columns are set without one.
    pub default_bloom_filter_fpp: f64,
    /// Upper bound on short key columns.
    pub max_short_key_column_count: u16,
    /// Upper bound on the byte width of the short key prefix.
    pub max_short_key_size_bytes: usize,
}

impl Default for AlterConfig {
    fn default() -> Self {
        Self {
            max_layout_length_per_row: 100_000,
            alter_table_timeout_secs: 86_400,
            alter_delete_base_delay_secs: 172_800,
            scheduler_interval_ms: 10_000,
            default_bloom_filter_fpp: 0.05,
            max_short_key_column_count: 3,
            max_short_key_size_bytes: 36,
        }
    }
}

impl AlterConfig {
    /// Scheduler tick interval.
    #[must_use]
    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler_interval_ms)
    }

    /// Job deadline in milliseconds.
    #[must_use]
    pub fn timeout_ms(&self) -> i64 {
        i64::try_from(self.alter_table_timeout_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }

    /// Delayed deletion window in milliseconds.
    #[must_use]
    pub fn delete_base_delay_ms(&self) -> i64 {
        i64::try_from(self.alter_delete_base_delay_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }
}

/// Report ingestion configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Capacity of the bounded report queue.
    pub queue_capacity: usize,
    /// How long an RPC handler blocks on a full queue before rejecting the report.
    pub enqueue_timeout_ms: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            enqueue_timeout_ms: 5000,
        }
    }
}

/// Metadata storage configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the edit log.
    pub meta_dir: String,
    /// Fsync the edit log on every append.
    pub edit_log_sync: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            meta_dir: "./tessera_meta".to_string(),
            edit_log_sync: true,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace.
    pub level: String,
    /// Log format: text or json.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Main `Tessera` configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TesseraConfig {
    /// Alter job configuration.
    pub alter: AlterConfig,
    /// Report ingestion configuration.
    pub report: ReportConfig,
    /// Metadata storage configuration.
    pub storage: StorageConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl TesseraConfig {
    /// Loads configuration from default sources.
    ///
    /// Priority: defaults < file < environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("tessera.toml")
    }

    /// Loads configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("TESSERA_").split("__").lowercase(true));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Creates a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alter.max_layout_length_per_row == 0 {
            return Err(ConfigError::InvalidValue {
                key: "alter.max_layout_length_per_row".to_string(),
                message: "value must be > 0".to_string(),
            });
        }

        if self.alter.scheduler_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "alter.scheduler_interval_ms".to_string(),
                message: "value must be > 0".to_string(),
            });
        }

        if self.alter.alter_table_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "alter.alter_table_timeout_secs".to_string(),
                message: "value must be > 0".to_string(),
            });
        }

        let fpp = self.alter.default_bloom_filter_fpp;
        if !(0.0001..=0.05).contains(&fpp) {
            return Err(ConfigError::InvalidValue {
                key: "alter.default_bloom_filter_fpp".to_string(),
                message: format!("value {fpp} is out of range [0.0001, 0.05]"),
            });
        }

        if self.alter.max_short_key_column_count == 0 {
            return Err(ConfigError::InvalidValue {
                key: "alter.max_short_key_column_count".to_string(),
                message: "value must be > 0".to_string(),
            });
        }

        if self.report.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "report.queue_capacity".to_string(),
                message: "value must be > 0".to_string(),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                message: format!(
                    "value '{}' is invalid, expected one of: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.format".to_string(),
                message: format!(
                    "value '{}' is invalid, expected one of: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        Ok(())
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}
