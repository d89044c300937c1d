//! Error types for the data lake layer.
//!
//! Data lake operations fail with [`DbError`]. When a store-backed routine
//! runs under the dispatcher, the error is converted into a
//! [`SyncError`] and captured for that single notification.

use twinsync_core::SyncError;

/// Errors that can occur in the data lake layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A Redis-protocol operation failed.
    #[error("data lake error: {0}")]
    Redis(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A key was not found in the data lake.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// A key holds a value of the wrong shape.
    #[error("invalid value at {key}: {reason}")]
    InvalidValue {
        /// Key that was read.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// No async runtime was available to drive a blocking call.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl From<DbError> for SyncError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Serialization(e) => Self::Serialization(e),
            other => Self::store(other.to_string()),
        }
    }
}

/// Errors that end a bus listener session.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Connecting or subscribing failed.
    #[error("subscription failed: {0}")]
    Subscribe(#[from] DbError),

    /// The transport stopped delivering messages.
    #[error("bus closed: no further notifications will be delivered")]
    BusClosed,
}
