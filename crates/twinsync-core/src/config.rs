//! Configuration loading and typed config structures.
//!
//! The listener reads `twinsync.yaml` from the working directory. Every
//! section is optional and falls back to the defaults below, so an empty
//! file (or no file) yields a runnable local configuration.
//!
//! ```yaml
//! datalake:
//!   url: redis://localhost:6379
//!   keys:
//!     published_time: datalake:time
//!     snapshots: twin:snapshots
//!     pending_commands: twin:commands:pending
//!     command_results: twin:commands:results
//! time:
//!   tick_period_ms: 1000
//!   start_time: 0
//!   publish_interval_ms: ~
//! logging:
//!   level: info
//!   format: pretty
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::clock::{LogicalTime, TickPeriod};

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override could not be parsed.
    #[error("invalid value for {name}: {reason}")]
    InvalidEnv {
        /// Environment variable name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The tick period is not positive.
    #[error("time.tick_period_ms must be at least 1")]
    InvalidTickPeriod,
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level listener configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// Data lake connection and key layout.
    #[serde(default)]
    pub datalake: DataLakeConfig,

    /// Clock settings.
    #[serde(default)]
    pub time: TimeConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SyncConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `DATALAKE_URL` overrides `datalake.url`
    /// - `TICK_PERIOD_MS` overrides `time.tick_period_ms`
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply env overrides.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config = Self::parse_without_env(yaml)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string, ignoring the environment.
    pub fn parse_without_env(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply `DATALAKE_URL` and `TICK_PERIOD_MS` when set.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = std::env::var("DATALAKE_URL") {
            self.datalake.url = url;
        }
        if let Ok(raw) = std::env::var("TICK_PERIOD_MS") {
            self.time.tick_period_ms = raw.parse().map_err(|e| ConfigError::InvalidEnv {
                name: "TICK_PERIOD_MS",
                reason: format!("{e}"),
            })?;
        }
        Ok(())
    }

    /// Validate the configuration and return the tick period.
    ///
    /// A non-positive tick period is a startup fault, never a runtime case.
    pub fn validate(&self) -> Result<TickPeriod, ConfigError> {
        TickPeriod::new(self.time.tick_period_ms).ok_or(ConfigError::InvalidTickPeriod)
    }
}

/// Data lake connection and key layout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DataLakeConfig {
    /// Redis-compatible URL (`redis://host:port/db`).
    #[serde(default = "default_datalake_url")]
    pub url: String,

    /// Keys used by the synchronization routines.
    #[serde(default)]
    pub keys: KeyConfig,
}

impl Default for DataLakeConfig {
    fn default() -> Self {
        Self {
            url: default_datalake_url(),
            keys: KeyConfig::default(),
        }
    }
}

/// Data lake key names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyConfig {
    /// Integer key holding the externally published time.
    #[serde(default = "default_published_time_key")]
    pub published_time: String,

    /// List receiving output snapshots.
    #[serde(default = "default_snapshots_key")]
    pub snapshots: String,

    /// List of commands waiting to be applied.
    #[serde(default = "default_pending_commands_key")]
    pub pending_commands: String,

    /// List receiving command results.
    #[serde(default = "default_command_results_key")]
    pub command_results: String,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            published_time: default_published_time_key(),
            snapshots: default_snapshots_key(),
            pending_commands: default_pending_commands_key(),
            command_results: default_command_results_key(),
        }
    }
}

/// Clock settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimeConfig {
    /// Logical milliseconds represented by one tick.
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,

    /// Logical time at which the twin clock starts.
    #[serde(default)]
    pub start_time: u64,

    /// When set, the listener also publishes the external time at this
    /// interval (milliseconds).
    #[serde(default)]
    pub publish_interval_ms: Option<u64>,
}

impl TimeConfig {
    /// Start time as a [`LogicalTime`].
    pub const fn start(&self) -> LogicalTime {
        LogicalTime::new(self.start_time)
    }
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: default_tick_period_ms(),
            start_time: 0,
            publish_interval_ms: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

fn default_datalake_url() -> String {
    "redis://localhost:6379".to_owned()
}

fn default_published_time_key() -> String {
    "datalake:time".to_owned()
}

fn default_snapshots_key() -> String {
    "twin:snapshots".to_owned()
}

fn default_pending_commands_key() -> String {
    "twin:commands:pending".to_owned()
}

fn default_command_results_key() -> String {
    "twin:commands:results".to_owned()
}

const fn default_tick_period_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_owned()
}
