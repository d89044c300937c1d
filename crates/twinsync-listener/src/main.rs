//! Listener binary for twinsync.
//!
//! Wires the data lake, the twin, and the channel dispatcher together and
//! runs one listener session until Ctrl-C or until the bus closes.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `twinsync.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Validate the tick period
//! 4. Connect the data lake and the bus listener
//! 5. Create the twin and its store-backed routines
//! 6. Optionally start the time broadcaster
//! 7. Run the listener session
//! 8. Log the session counters

mod error;

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use twinsync_core::config::{LogFormat, LoggingConfig, SyncConfig};
use twinsync_core::twin::{AttributeTwin, TwinHandle};
use twinsync_core::{ChannelDispatcher, Collaborators};
use twinsync_datalake::{BusListener, ClockBroadcaster, DataLakePool, LakeRoutines};

use crate::error::AppError;

/// Config file looked up in the working directory.
const CONFIG_PATH: &str = "twinsync.yaml";

/// Application entry point for the listener.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the data lake cannot be
/// reached, or the listener session ends abnormally.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Load configuration.
    let config = load_config(Path::new(CONFIG_PATH))?;

    // 2. Initialize structured logging.
    init_logging(&config.logging)?;
    info!("twinsync-listener starting");

    // 3. Validate.
    let tick_period = config.validate()?;
    info!(
        datalake_url = config.datalake.url,
        tick_period_ms = tick_period.get(),
        start_time = config.time.start_time,
        publish_interval_ms = ?config.time.publish_interval_ms,
        "Configuration loaded"
    );

    // 4. Connect.
    let lake = DataLakePool::connect(&config.datalake.url).await?;
    let listener = BusListener::connect(&config.datalake.url).await?;

    // 5. Twin and routines.
    let twin = TwinHandle::new(AttributeTwin::new(config.time.start(), tick_period));
    let mut clock = twin.clone();
    let mut routines = LakeRoutines::new(&twin, &config.datalake.keys);

    // 6. Time broadcaster.
    let broadcaster = config.time.publish_interval_ms.map(|interval_ms| {
        let broadcaster = ClockBroadcaster::new(
            lake.clone(),
            config.datalake.keys.published_time.clone(),
            config.time.start(),
            Duration::from_millis(interval_ms),
        );
        tokio::spawn(broadcaster.run(std::future::pending::<()>()))
    });

    // 7. Run the session.
    let mut dispatcher = ChannelDispatcher::new(
        &lake,
        Collaborators {
            clock: &mut clock,
            time: &routines.time,
            snapshots: &mut routines.snapshots,
            commands: &mut routines.commands,
            results: &mut routines.results,
        },
        tick_period,
    );
    info!("Listener subscribing, entering dispatch loop");
    let session = listener.run(&mut dispatcher, shutdown_signal()).await;

    if let Some(handle) = broadcaster {
        handle.abort();
    }

    // 8. Log results.
    let stats = dispatcher.stats();
    info!(
        handled = stats.handled,
        ignored = stats.ignored,
        failed = stats.failed,
        subscriptions = stats.subscriptions,
        "Listener session ended"
    );
    let end = session?;
    info!(end = ?end, "twinsync-listener shutdown complete");

    Ok(())
}

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist. Environment overrides apply in both cases.
fn load_config(path: &Path) -> Result<SyncConfig, AppError> {
    if path.exists() {
        Ok(SyncConfig::from_file(path)?)
    } else {
        Ok(SyncConfig::parse("")?)
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
fn init_logging(logging: &LoggingConfig) -> Result<(), AppError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(fallback_directive(&logging.level)));
    let installed = match logging.format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
    };
    installed.map_err(|e| AppError::Logging {
        message: format!("{e}"),
    })
}

/// Filter directive used when `RUST_LOG` is unset.
fn fallback_directive(level: &str) -> &str {
    let level = level.trim();
    if level.is_empty() { "info" } else { level }
}

/// Completes on Ctrl-C. If the signal handler cannot be installed the
/// session runs until the bus closes.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C, running until the bus closes");
        std::future::pending::<()>().await;
    }
    info!("Ctrl-C received");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn blank_level_falls_back_to_info() {
        assert_eq!(fallback_directive(""), "info");
        assert_eq!(fallback_directive("   "), "info");
    }

    #[test]
    fn configured_level_is_used() {
        assert_eq!(fallback_directive("debug"), "debug");
        assert_eq!(
            fallback_directive("twinsync_core=trace,info"),
            "twinsync_core=trace,info"
        );
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let config = load_config(Path::new("does-not-exist/twinsync.yaml")).unwrap();
        assert_eq!(config.datalake.keys.published_time, "datalake:time");
        assert!(config.time.publish_interval_ms.is_none());
    }
}
