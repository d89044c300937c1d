//! External time broadcaster.
//!
//! Stands in for the external time source: at a fixed interval it writes the
//! elapsed logical time into the data lake and announces it on
//! `TimeChannel`, which drives the listener's time-advance step.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use twinsync_core::{ChannelId, LogicalTime};

use crate::error::DbError;
use crate::lake::DataLakePool;

/// Periodically publishes the external time.
#[derive(Debug, Clone)]
pub struct ClockBroadcaster {
    lake: DataLakePool,
    key: String,
    start: LogicalTime,
    interval: Duration,
}

impl ClockBroadcaster {
    /// Publish `start + elapsed` to `key` every `interval`.
    pub fn new(
        lake: DataLakePool,
        key: impl Into<String>,
        start: LogicalTime,
        interval: Duration,
    ) -> Self {
        Self {
            lake,
            key: key.into(),
            start,
            interval,
        }
    }

    /// Write `time` to the time key and announce it on `TimeChannel`.
    pub async fn publish(&self, time: LogicalTime) -> Result<u64, DbError> {
        self.lake.set_time(&self.key, time).await?;
        self.lake.publish(&ChannelId::Time, &time.to_string()).await
    }

    /// Publish on every interval until `shutdown` completes.
    ///
    /// A failed publish is logged and retried on the next interval.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let origin = Instant::now();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            key = %self.key,
            interval_ms = self.interval.as_millis(),
            start = %self.start,
            "time broadcaster started"
        );
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                now = ticker.tick() => {
                    let time = published_time(self.start, now.saturating_duration_since(origin));
                    match self.publish(time).await {
                        Ok(receivers) => debug!(time = %time, receivers, "published time"),
                        Err(e) => warn!(time = %time, error = %e, "failed to publish time"),
                    }
                }
            }
        }
        info!("time broadcaster stopped");
    }
}

/// Logical time `elapsed` after `start`, in milliseconds, saturating.
pub fn published_time(start: LogicalTime, elapsed: Duration) -> LogicalTime {
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    LogicalTime::new(start.get().saturating_add(elapsed_ms))
}
