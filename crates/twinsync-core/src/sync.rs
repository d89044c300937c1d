//! Contracts for the synchronization routines.
//!
//! Each routine is an external collaborator from the dispatcher's point of
//! view. The dispatcher hands it the borrowed store handle `S` and treats the
//! call as blocking; what is read or written is entirely the routine's
//! business. Notifications are triggers, not carriers, so no routine receives
//! the message payload.

use crate::clock::{ClockError, LogicalTime};

/// Failure of a synchronization routine.
///
/// Every variant is recovered at the granularity of a single notification.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The data store could not be read or written.
    #[error("store error: {message}")]
    Store {
        /// Description of the store failure.
        message: String,
    },

    /// A stored value could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The twin rejected or failed to apply a change.
    #[error("model error: {message}")]
    Model {
        /// Description of the model failure.
        message: String,
    },

    /// The twin clock failed.
    #[error("clock error: {0}")]
    Clock(#[from] ClockError),
}

impl SyncError {
    /// Shorthand for a [`SyncError::Store`].
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Shorthand for a [`SyncError::Model`].
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model {
            message: message.into(),
        }
    }
}

/// Outbound-snapshot sync: pull the twin's current state into the store.
pub trait SnapshotSync<S: ?Sized> {
    /// Persist the twin's current snapshot.
    fn persist_current_snapshot(&mut self, store: &S) -> Result<(), SyncError>;
}

/// Inbound-command sync: read pending commands from the store and apply them.
pub trait CommandSync<S: ?Sized> {
    /// Apply every pending command to the twin.
    fn apply_pending_commands(&mut self, store: &S) -> Result<(), SyncError>;
}

/// Command-result sync: write command outcomes to the store.
pub trait CommandResultSync<S: ?Sized> {
    /// Persist outstanding command results.
    fn persist_command_results(&mut self, store: &S) -> Result<(), SyncError>;
}

/// Reader for the time published by the external time source.
pub trait TimePublisher<S: ?Sized> {
    /// Read the latest published external time.
    fn read_published_time(&self, store: &S) -> Result<LogicalTime, SyncError>;
}
