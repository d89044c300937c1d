//! Data lake (Redis-compatible) operations.
//!
//! The data lake holds everything the twin exchanges with the outside world.
//! Key names come from [`KeyConfig`]; the defaults are:
//!
//! | Key | Type | Description |
//! |-----|------|-------------|
//! | `datalake:time` | Integer | Published external time |
//! | `twin:snapshots` | List | Output snapshots, appended |
//! | `twin:commands:pending` | List | Commands waiting, popped from the head |
//! | `twin:commands:results` | List | Command results, appended |
//!
//! [`KeyConfig`]: twinsync_core::config::KeyConfig

use std::future::Future;

use fred::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::{Handle, RuntimeFlavor};
use twinsync_core::{ChannelId, LogicalTime};

use crate::error::DbError;

/// Connection handle to the data lake.
///
/// Wraps a [`fred::prelude::Client`] used for regular commands. Bus
/// subscriptions need their own connection, see
/// [`BusListener`](crate::listener::BusListener).
#[derive(Clone)]
pub struct DataLakePool {
    client: Client,
}

impl DataLakePool {
    /// Connect to the data lake at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Redis`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let client = connect_client(url).await?;
        tracing::info!(url = url, "connected to data lake");
        Ok(Self { client })
    }

    // =========================================================================
    // Published time
    // =========================================================================

    /// Store a logical time at `key` as a decimal integer.
    pub async fn set_time(&self, key: &str, time: LogicalTime) -> Result<(), DbError> {
        let _: () = self
            .client
            .set(key, time.get().to_string().as_str(), None, None, false)
            .await?;
        Ok(())
    }

    /// Read the logical time stored at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::KeyNotFound`] if not set.
    /// Returns [`DbError::InvalidValue`] if the value is not a `u64`.
    pub async fn get_time(&self, key: &str) -> Result<LogicalTime, DbError> {
        let value: Option<String> = self.client.get(key).await?;
        value.map_or_else(
            || Err(DbError::KeyNotFound(key.to_owned())),
            |s| parse_time(key, &s),
        )
    }

    // =========================================================================
    // JSON lists
    // =========================================================================

    /// Append a JSON value to the list at `key` (RPUSH).
    pub async fn push_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), DbError> {
        let json = serde_json::to_string(value)?;
        let _: u64 = self.client.rpush(key, json.as_str()).await?;
        Ok(())
    }

    /// Remove and deserialize the head of the list at `key` (LPOP).
    ///
    /// Returns `None` once the list is empty. An entry that fails to
    /// deserialize has already been removed when the error is returned.
    pub async fn pop_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DbError> {
        let value: Option<String> = self.client.lpop(key, None).await?;
        value
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(DbError::from)
    }

    /// Read every entry of the list at `key`, oldest first.
    pub async fn list_json<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, DbError> {
        let values: Vec<String> = self.client.lrange(key, 0, -1).await?;
        let mut entries = Vec::with_capacity(values.len());
        for v in &values {
            entries.push(serde_json::from_str(v)?);
        }
        Ok(entries)
    }

    // =========================================================================
    // Bus
    // =========================================================================

    /// Publish `payload` on a bus channel. Returns the number of receivers.
    pub async fn publish(&self, channel: &ChannelId, payload: &str) -> Result<u64, DbError> {
        let receivers: u64 = self.client.publish(channel.as_str(), payload).await?;
        Ok(receivers)
    }

    /// Flush all keys from the data lake.
    ///
    /// **WARNING:** This deletes all data. Only use for testing.
    pub async fn flush_all(&self) -> Result<(), DbError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }
}

impl std::fmt::Debug for DataLakePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLakePool").finish_non_exhaustive()
    }
}

/// Build and initialize a client for `url`.
pub(crate) async fn connect_client(url: &str) -> Result<Client, DbError> {
    let config =
        Config::from_url(url).map_err(|e| DbError::Config(format!("invalid data lake URL: {e}")))?;
    let client = Builder::from_config(config).build()?;
    client.init().await?;
    Ok(client)
}

/// Parse a stored decimal timestamp.
pub(crate) fn parse_time(key: &str, raw: &str) -> Result<LogicalTime, DbError> {
    raw.trim()
        .parse::<u64>()
        .map(LogicalTime::new)
        .map_err(|e| DbError::InvalidValue {
            key: key.to_owned(),
            reason: format!("not a non-negative integer ({raw:?}): {e}"),
        })
}

/// Drive an async data lake call to completion from synchronous code.
///
/// The synchronization routines are blocking from the dispatcher's point of
/// view, while the client is async. This bridges the two on the current
/// tokio runtime via `block_in_place`, which requires the multi-threaded
/// scheduler.
///
/// # Errors
///
/// Returns [`DbError::Runtime`] when called outside a tokio runtime or on a
/// current-thread runtime, or the error produced by `fut`.
pub fn block_on<F, T>(fut: F) -> Result<T, DbError>
where
    F: Future<Output = Result<T, DbError>>,
{
    let handle = Handle::try_current()
        .map_err(|e| DbError::Runtime(format!("no tokio runtime available: {e}")))?;
    let flavor = handle.runtime_flavor();
    if flavor != RuntimeFlavor::MultiThread {
        return Err(DbError::Runtime(format!(
            "blocking data lake calls need the multi-thread runtime, found {flavor:?}"
        )));
    }
    tokio::task::block_in_place(|| handle.block_on(fut))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use twinsync_core::clock::TwinClock;
    use twinsync_core::{
        ChannelDispatcher, Collaborators, CommandResultSync, CommandSync, DispatchOutcome,
        NotificationHandler, SnapshotSync, SyncError, TickPeriod, TimePublisher,
    };

    use super::*;

    #[test]
    fn parse_time_accepts_integers() {
        assert_eq!(parse_time("k", "1000").unwrap(), LogicalTime::new(1000));
        assert_eq!(parse_time("k", " 42\n").unwrap(), LogicalTime::new(42));
    }

    #[test]
    fn parse_time_rejects_garbage() {
        for raw in ["", "-5", "12.5", "soon"] {
            let err = parse_time("datalake:time", raw);
            assert!(
                matches!(err, Err(DbError::InvalidValue { ref key, .. }) if key == "datalake:time"),
                "expected InvalidValue for {raw:?}"
            );
        }
    }

    #[test]
    fn block_on_without_runtime_is_an_error() {
        let result = block_on(async { Ok::<_, DbError>(1) });
        assert!(matches!(result, Err(DbError::Runtime(_))));
    }

    #[tokio::test]
    async fn block_on_on_current_thread_runtime_is_an_error() {
        let result = block_on(async { Ok::<_, DbError>(1) });
        assert!(matches!(result, Err(DbError::Runtime(_))));
    }

    #[tokio::test]
    async fn current_thread_runtime_fails_only_the_notification() {
        struct BridgedSnapshot;

        impl SnapshotSync<()> for BridgedSnapshot {
            fn persist_current_snapshot(&mut self, _: &()) -> Result<(), SyncError> {
                Ok(block_on(async { Ok::<_, DbError>(()) })?)
            }
        }

        struct Idle;

        impl SnapshotSync<()> for Idle {
            fn persist_current_snapshot(&mut self, _: &()) -> Result<(), SyncError> {
                Ok(())
            }
        }
        impl CommandSync<()> for Idle {
            fn apply_pending_commands(&mut self, _: &()) -> Result<(), SyncError> {
                Ok(())
            }
        }
        impl CommandResultSync<()> for Idle {
            fn persist_command_results(&mut self, _: &()) -> Result<(), SyncError> {
                Ok(())
            }
        }
        impl TimePublisher<()> for Idle {
            fn read_published_time(&self, _: &()) -> Result<LogicalTime, SyncError> {
                Ok(LogicalTime::ZERO)
            }
        }

        let period = TickPeriod::new(100).unwrap();
        let mut clock = TwinClock::new(LogicalTime::ZERO, period);
        let time = Idle;
        let mut snapshots = BridgedSnapshot;
        let mut commands = Idle;
        let mut results = Idle;
        let mut dispatcher = ChannelDispatcher::new(
            &(),
            Collaborators {
                clock: &mut clock,
                time: &time,
                snapshots: &mut snapshots,
                commands: &mut commands,
                results: &mut results,
            },
            period,
        );

        let outcome = dispatcher.on_notification("DTOutChannel", "");
        assert!(matches!(
            outcome,
            DispatchOutcome::Failed {
                error: SyncError::Store { .. },
                ..
            }
        ));
        assert!(dispatcher.on_notification("CommandInChannel", "").is_handled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn block_on_inside_runtime_completes() {
        let value = block_on(async { Ok::<_, DbError>(7) }).unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    #[ignore]
    async fn connect_to_local_lake() {
        let result = DataLakePool::connect("redis://localhost:6379").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn invalid_url_is_a_config_error() {
        let result = DataLakePool::connect("not a url").await;
        assert!(matches!(result, Err(DbError::Config(_))));
    }
}
