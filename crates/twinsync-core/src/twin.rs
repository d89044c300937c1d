//! Twin model contract and JSON envelopes.
//!
//! The dispatcher never looks inside snapshots or commands. The store-backed
//! routines only need a model that can report its state as JSON, apply a
//! command body, and hand back the results it produced. [`TwinModel`]
//! captures that; [`AttributeTwin`] is a small reference model used by the
//! listener binary and in tests.
//!
//! The model is shared between the clock and the three routines through a
//! [`TwinHandle`], which serializes access with a mutex.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::clock::{ClockError, ClockSource, LogicalTime, TickPeriod, TwinClock};
use crate::sync::SyncError;

/// A command waiting in the data lake to be applied to the twin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwinCommand {
    /// Caller-assigned identifier, echoed back in the [`CommandResult`].
    pub id: String,
    /// Opaque command body interpreted by the model.
    pub body: Value,
}

/// Outcome of applying one [`TwinCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Identifier of the command this result answers.
    pub command_id: String,
    /// Whether the model accepted the command.
    pub accepted: bool,
    /// Rejection reason or other detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Twin time at which the command was applied.
    pub twin_time: LogicalTime,
    /// Wall-clock time at which the command was applied.
    pub completed_at: DateTime<Utc>,
}

/// A snapshot of the twin's state leaving the twin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSnapshot {
    /// Unique, time-ordered snapshot identifier.
    pub snapshot_id: Uuid,
    /// Twin time at capture.
    pub twin_time: LogicalTime,
    /// Wall-clock time at capture.
    pub captured_at: DateTime<Utc>,
    /// Opaque model state.
    pub state: Value,
}

impl OutputSnapshot {
    /// Capture `state` at `twin_time`.
    pub fn capture(twin_time: LogicalTime, state: Value) -> Self {
        Self {
            snapshot_id: Uuid::now_v7(),
            twin_time,
            captured_at: Utc::now(),
            state,
        }
    }
}

/// What the store-backed routines need from a twin.
pub trait TwinModel: ClockSource {
    /// Current model state as JSON.
    fn snapshot(&self) -> Result<Value, SyncError>;

    /// Apply one command, recording its result for later collection.
    ///
    /// A rejected command is not an error: it produces a result with
    /// `accepted: false`. Errors are reserved for model failures.
    fn apply_command(&mut self, command: &TwinCommand) -> Result<(), SyncError>;

    /// Remove and return every result recorded since the last call.
    fn drain_results(&mut self) -> Vec<CommandResult>;
}

/// Reference twin: a flat attribute map driven by a [`TwinClock`].
///
/// Commands are objects of the form `{"set": {"key": value, ...}}` and/or
/// `{"unset": ["key", ...]}`. Anything else is rejected.
#[derive(Debug, Clone)]
pub struct AttributeTwin {
    clock: TwinClock,
    attributes: BTreeMap<String, Value>,
    results: Vec<CommandResult>,
}

impl AttributeTwin {
    /// Create an empty twin whose clock starts at `start`.
    pub const fn new(start: LogicalTime, period: TickPeriod) -> Self {
        Self {
            clock: TwinClock::new(start, period),
            attributes: BTreeMap::new(),
            results: Vec::new(),
        }
    }

    /// Read one attribute.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Borrow the twin's clock.
    pub const fn clock(&self) -> &TwinClock {
        &self.clock
    }

    fn apply_body(&mut self, body: &Value) -> Result<(), String> {
        let Some(object) = body.as_object() else {
            return Err("command body must be an object".to_owned());
        };
        let set = object.get("set");
        let unset = object.get("unset");
        if set.is_none() && unset.is_none() {
            return Err("command must contain `set` or `unset`".to_owned());
        }

        let set = match set {
            Some(Value::Object(map)) => Some(map),
            Some(_) => return Err("`set` must be an object".to_owned()),
            None => None,
        };
        let unset = match unset {
            Some(Value::Array(keys)) => keys
                .iter()
                .map(|k| {
                    k.as_str()
                        .map(str::to_owned)
                        .ok_or_else(|| "`unset` entries must be strings".to_owned())
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err("`unset` must be an array".to_owned()),
            None => Vec::new(),
        };

        // Validated in full above, so a rejected command changes nothing.
        if let Some(map) = set {
            for (key, value) in map {
                self.attributes.insert(key.clone(), value.clone());
            }
        }
        for key in &unset {
            self.attributes.remove(key);
        }
        Ok(())
    }
}

impl ClockSource for AttributeTwin {
    fn current_time(&self) -> Result<LogicalTime, ClockError> {
        self.clock.current_time()
    }

    fn advance_time(&mut self, ticks: u64) -> Result<(), ClockError> {
        self.clock.advance_time(ticks)
    }
}

impl TwinModel for AttributeTwin {
    fn snapshot(&self) -> Result<Value, SyncError> {
        Ok(serde_json::to_value(&self.attributes)?)
    }

    fn apply_command(&mut self, command: &TwinCommand) -> Result<(), SyncError> {
        let outcome = self.apply_body(&command.body);
        self.results.push(CommandResult {
            command_id: command.id.clone(),
            accepted: outcome.is_ok(),
            detail: outcome.err(),
            twin_time: self.clock.now(),
            completed_at: Utc::now(),
        });
        Ok(())
    }

    fn drain_results(&mut self) -> Vec<CommandResult> {
        std::mem::take(&mut self.results)
    }
}

/// Shared, mutex-guarded handle to a twin model.
///
/// Clones share the same model. The handle itself implements
/// [`ClockSource`] so it can be given to the dispatcher as the clock while
/// the routines hold their own clones.
#[derive(Debug)]
pub struct TwinHandle<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for TwinHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> TwinHandle<T> {
    /// Wrap a model.
    pub fn new(model: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(model)),
        }
    }

    /// Lock the model, mapping a poisoned lock to a [`SyncError::Model`].
    pub fn lock(&self) -> Result<MutexGuard<'_, T>, SyncError> {
        self.inner
            .lock()
            .map_err(|e| SyncError::model(format!("twin lock poisoned: {e}")))
    }

    fn lock_clock(&self) -> Result<MutexGuard<'_, T>, ClockError> {
        self.inner.lock().map_err(|e| ClockError::Unavailable {
            reason: format!("twin lock poisoned: {e}"),
        })
    }
}

impl<T: ClockSource> ClockSource for TwinHandle<T> {
    fn current_time(&self) -> Result<LogicalTime, ClockError> {
        self.lock_clock()?.current_time()
    }

    fn advance_time(&mut self, ticks: u64) -> Result<(), ClockError> {
        self.lock_clock()?.advance_time(ticks)
    }
}
