//! Store-backed synchronization routines.
//!
//! These implement the core routine contracts against a [`DataLakePool`] and
//! any [`TwinModel`] shared through a [`TwinHandle`]. Each call is blocking:
//! the async data lake client is driven with [`block_on`].

use std::collections::VecDeque;

use tracing::{debug, warn};
use twinsync_core::config::KeyConfig;
use twinsync_core::twin::{CommandResult, OutputSnapshot, TwinCommand, TwinHandle, TwinModel};
use twinsync_core::{
    CommandResultSync, CommandSync, LogicalTime, SnapshotSync, SyncError, TimePublisher,
};

use crate::error::DbError;
use crate::lake::{block_on, DataLakePool};

/// Reads the externally published time from a fixed key.
#[derive(Debug, Clone)]
pub struct PublishedTimeReader {
    key: String,
}

impl PublishedTimeReader {
    /// Read the published time from `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl TimePublisher<DataLakePool> for PublishedTimeReader {
    fn read_published_time(&self, lake: &DataLakePool) -> Result<LogicalTime, SyncError> {
        Ok(block_on(lake.get_time(&self.key))?)
    }
}

/// Appends the twin's current snapshot to the snapshot list.
#[derive(Debug)]
pub struct SnapshotPersister<T> {
    twin: TwinHandle<T>,
    key: String,
}

impl<T> SnapshotPersister<T> {
    /// Persist snapshots of `twin` to the list at `key`.
    pub fn new(twin: TwinHandle<T>, key: impl Into<String>) -> Self {
        Self {
            twin,
            key: key.into(),
        }
    }
}

impl<T: TwinModel> SnapshotSync<DataLakePool> for SnapshotPersister<T> {
    fn persist_current_snapshot(&mut self, lake: &DataLakePool) -> Result<(), SyncError> {
        let snapshot = {
            let twin = self.twin.lock()?;
            OutputSnapshot::capture(twin.current_time()?, twin.snapshot()?)
        };
        block_on(lake.push_json(&self.key, &snapshot))?;
        debug!(
            snapshot_id = %snapshot.snapshot_id,
            twin_time = %snapshot.twin_time,
            "snapshot persisted"
        );
        Ok(())
    }
}

/// Pops pending commands from the data lake and applies them to the twin.
///
/// Commands are applied in list order until the list is empty. An entry that
/// cannot be decoded has already been popped when the error surfaces; it is
/// dropped, the rest of the list is still applied, and the first decode
/// error is returned once the list is drained.
#[derive(Debug)]
pub struct CommandApplier<T> {
    twin: TwinHandle<T>,
    key: String,
}

impl<T> CommandApplier<T> {
    /// Apply commands queued at `key` to `twin`.
    pub fn new(twin: TwinHandle<T>, key: impl Into<String>) -> Self {
        Self {
            twin,
            key: key.into(),
        }
    }
}

impl<T: TwinModel> CommandSync<DataLakePool> for CommandApplier<T> {
    fn apply_pending_commands(&mut self, lake: &DataLakePool) -> Result<(), SyncError> {
        let mut applied: u64 = 0;
        let mut first_error: Option<SyncError> = None;
        loop {
            match block_on(lake.pop_json::<TwinCommand>(&self.key)) {
                Ok(Some(command)) => {
                    self.twin.lock()?.apply_command(&command)?;
                    applied = applied.saturating_add(1);
                    debug!(command_id = %command.id, "command applied");
                }
                Ok(None) => break,
                Err(DbError::Serialization(e)) => {
                    warn!(key = %self.key, error = %e, "dropped undecodable command");
                    if first_error.is_none() {
                        first_error = Some(SyncError::Serialization(e));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        debug!(applied, "pending commands drained");
        first_error.map_or(Ok(()), Err)
    }
}

/// Moves command results from the twin into the results list.
///
/// Results drained from the twin but not yet written are kept in a backlog
/// and retried first on the next notification.
#[derive(Debug)]
pub struct ResultPersister<T> {
    twin: TwinHandle<T>,
    key: String,
    backlog: VecDeque<CommandResult>,
}

impl<T> ResultPersister<T> {
    /// Persist results of `twin` to the list at `key`.
    pub fn new(twin: TwinHandle<T>, key: impl Into<String>) -> Self {
        Self {
            twin,
            key: key.into(),
            backlog: VecDeque::new(),
        }
    }

    /// Results drained from the twin that have not been written yet.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }
}

impl<T: TwinModel> CommandResultSync<DataLakePool> for ResultPersister<T> {
    fn persist_command_results(&mut self, lake: &DataLakePool) -> Result<(), SyncError> {
        self.backlog.extend(self.twin.lock()?.drain_results());
        while let Some(result) = self.backlog.front() {
            block_on(lake.push_json(&self.key, result))?;
            self.backlog.pop_front();
        }
        Ok(())
    }
}

/// The store-backed routines for one twin, built from the configured keys.
#[derive(Debug)]
pub struct LakeRoutines<T> {
    /// Published time reader.
    pub time: PublishedTimeReader,
    /// Snapshot routine.
    pub snapshots: SnapshotPersister<T>,
    /// Command routine.
    pub commands: CommandApplier<T>,
    /// Result routine.
    pub results: ResultPersister<T>,
}

impl<T> LakeRoutines<T> {
    /// Build all routines for `twin` using `keys`.
    pub fn new(twin: &TwinHandle<T>, keys: &KeyConfig) -> Self {
        Self {
            time: PublishedTimeReader::new(keys.published_time.clone()),
            snapshots: SnapshotPersister::new(twin.clone(), keys.snapshots.clone()),
            commands: CommandApplier::new(twin.clone(), keys.pending_commands.clone()),
            results: ResultPersister::new(twin.clone(), keys.command_results.clone()),
        }
    }
}
