//! Error types for the listener binary.
//!
//! [`AppError`] wraps every failure that can stop the process: invalid
//! configuration, the initial data lake connection, and the listener
//! session itself. Per-message routine failures never reach this type.

use twinsync_core::config::ConfigError;
use twinsync_datalake::{DbError, ListenerError};

/// Top-level error for the listener binary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// Connecting to the data lake failed.
    #[error("data lake error: {source}")]
    DataLake {
        /// The underlying data lake error.
        #[from]
        source: DbError,
    },

    /// The listener session ended abnormally.
    #[error("listener error: {source}")]
    Listener {
        /// The underlying listener error.
        #[from]
        source: ListenerError,
    },

    /// Logging could not be installed.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },
}
