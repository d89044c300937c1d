//! Integration tests for the `twinsync-datalake` layer.
//!
//! These tests require a live Redis-compatible server on `localhost:6379`.
//! Run with:
//!
//! ```bash
//! docker run --rm -d -p 6379:6379 redis:7
//! cargo test -p twinsync-datalake -- --ignored --test-threads=1
//! ```
//!
//! All tests are marked `#[ignore]` so they are skipped during normal
//! `cargo test` runs. Each test flushes the database first.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::too_many_lines
)]

use std::time::Duration;

use serde_json::json;
use twinsync_core::config::KeyConfig;
use twinsync_core::twin::{AttributeTwin, CommandResult, OutputSnapshot, TwinCommand, TwinHandle};
use twinsync_core::{
    ChannelDispatcher, ChannelId, ClockSource, Collaborators, DispatchOutcome, LogicalTime,
    NotificationHandler, SyncError, TickPeriod,
};
use twinsync_datalake::{BusListener, ClockBroadcaster, DataLakePool, DbError, LakeRoutines, SessionEnd};

/// Data lake URL for the local Docker instance.
const DATALAKE_URL: &str = "redis://localhost:6379";

async fn setup_lake() -> DataLakePool {
    let lake = DataLakePool::connect(DATALAKE_URL)
        .await
        .expect("Failed to connect to the data lake -- is Docker running?");
    lake.flush_all().await.expect("Failed to flush data lake");
    lake
}

const fn period() -> TickPeriod {
    TickPeriod::new(100).unwrap()
}

fn new_twin(start: u64) -> TwinHandle<AttributeTwin> {
    TwinHandle::new(AttributeTwin::new(LogicalTime::new(start), period()))
}

// =============================================================================
// Key operations
// =============================================================================

#[tokio::test]
#[ignore]
async fn time_round_trip() {
    let lake = setup_lake().await;
    lake.set_time("datalake:time", LogicalTime::new(12_345))
        .await
        .unwrap();
    let time = lake.get_time("datalake:time").await.unwrap();
    assert_eq!(time, LogicalTime::new(12_345));
}

#[tokio::test]
#[ignore]
async fn missing_time_is_key_not_found() {
    let lake = setup_lake().await;
    let result = lake.get_time("datalake:time").await;
    assert!(matches!(result, Err(DbError::KeyNotFound(_))));
}

#[tokio::test]
#[ignore]
async fn json_list_is_fifo() {
    let lake = setup_lake().await;
    lake.push_json("q", &json!({"n": 1})).await.unwrap();
    lake.push_json("q", &json!({"n": 2})).await.unwrap();

    let all: Vec<serde_json::Value> = lake.list_json("q").await.unwrap();
    assert_eq!(all, vec![json!({"n": 1}), json!({"n": 2})]);

    let first: Option<serde_json::Value> = lake.pop_json("q").await.unwrap();
    assert_eq!(first, Some(json!({"n": 1})));
    let second: Option<serde_json::Value> = lake.pop_json("q").await.unwrap();
    assert_eq!(second, Some(json!({"n": 2})));
    let none: Option<serde_json::Value> = lake.pop_json("q").await.unwrap();
    assert_eq!(none, None);
}

// =============================================================================
// Routines under the dispatcher
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore]
async fn routines_round_trip_through_the_lake() {
    let lake = setup_lake().await;
    let keys = KeyConfig::default();
    let twin = new_twin(850);
    let mut clock = twin.clone();
    let mut routines = LakeRoutines::new(&twin, &keys);

    lake.push_json(
        &keys.pending_commands,
        &TwinCommand {
            id: "c1".to_owned(),
            body: json!({"set": {"valve": "open"}}),
        },
    )
    .await
    .unwrap();
    lake.push_json(
        &keys.pending_commands,
        &TwinCommand {
            id: "c2".to_owned(),
            body: json!("explode"),
        },
    )
    .await
    .unwrap();
    lake.set_time(&keys.published_time, LogicalTime::new(1_000))
        .await
        .unwrap();

    let mut dispatcher = ChannelDispatcher::new(
        &lake,
        Collaborators {
            clock: &mut clock,
            time: &routines.time,
            snapshots: &mut routines.snapshots,
            commands: &mut routines.commands,
            results: &mut routines.results,
        },
        period(),
    );

    assert!(dispatcher.on_notification("CommandInChannel", "").is_handled());
    assert!(dispatcher.on_notification("CommandOutChannel", "").is_handled());
    assert!(dispatcher.on_notification("TimeChannel", "").is_handled());
    assert!(dispatcher.on_notification("DTOutChannel", "").is_handled());
    assert_eq!(dispatcher.stats().handled, 4);
    drop(dispatcher);

    let results: Vec<CommandResult> = lake.list_json(&keys.command_results).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().any(|r| r.command_id == "c1" && r.accepted));
    assert!(results.iter().any(|r| r.command_id == "c2" && !r.accepted));

    assert_eq!(twin.current_time().unwrap(), LogicalTime::new(950));

    let snapshots: Vec<OutputSnapshot> = lake.list_json(&keys.snapshots).await.unwrap();
    assert_eq!(snapshots.len(), 1);
    let snapshot = snapshots.first().unwrap();
    assert_eq!(snapshot.twin_time, LogicalTime::new(950));
    assert_eq!(snapshot.state, json!({"valve": "open"}));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore]
async fn malformed_command_fails_only_its_notification() {
    let lake = setup_lake().await;
    let keys = KeyConfig::default();
    let twin = new_twin(0);
    let mut clock = twin.clone();
    let mut routines = LakeRoutines::new(&twin, &keys);

    // A bare JSON string is not a command envelope.
    lake.push_json(&keys.pending_commands, &"reboot now")
        .await
        .unwrap();
    lake.push_json(
        &keys.pending_commands,
        &TwinCommand {
            id: "ok".to_owned(),
            body: json!({"set": {"x": 1}}),
        },
    )
    .await
    .unwrap();

    let mut dispatcher = ChannelDispatcher::new(
        &lake,
        Collaborators {
            clock: &mut clock,
            time: &routines.time,
            snapshots: &mut routines.snapshots,
            commands: &mut routines.commands,
            results: &mut routines.results,
        },
        period(),
    );

    let outcome = dispatcher.on_notification("CommandInChannel", "");
    assert!(matches!(
        outcome,
        DispatchOutcome::Failed {
            channel: ChannelId::CommandIn,
            error: SyncError::Serialization(_),
        }
    ));

    // Time key was never published, so the time channel fails on its own.
    assert!(dispatcher.on_notification("TimeChannel", "").is_failed());
    assert_eq!(dispatcher.stats().failed, 2);
    drop(dispatcher);

    // The command queued behind the bad entry was applied by the same trigger.
    assert_eq!(twin.lock().unwrap().attribute("x"), Some(&json!(1)));
    let pending: Vec<TwinCommand> = lake.list_json(&keys.pending_commands).await.unwrap();
    assert!(pending.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore]
async fn unwritten_results_are_retried_first() {
    let lake = setup_lake().await;
    let keys = KeyConfig::default();
    let twin = new_twin(0);
    let mut clock = twin.clone();
    let mut routines = LakeRoutines::new(&twin, &keys);

    for id in ["r1", "r2"] {
        lake.push_json(
            &keys.pending_commands,
            &TwinCommand {
                id: id.to_owned(),
                body: json!({"set": {"n": id}}),
            },
        )
        .await
        .unwrap();
    }
    // A string at the results key makes every append fail with WRONGTYPE.
    lake.set_time(&keys.command_results, LogicalTime::ZERO)
        .await
        .unwrap();

    {
        let mut dispatcher = ChannelDispatcher::new(
            &lake,
            Collaborators {
                clock: &mut clock,
                time: &routines.time,
                snapshots: &mut routines.snapshots,
                commands: &mut routines.commands,
                results: &mut routines.results,
            },
            period(),
        );
        assert!(dispatcher.on_notification("CommandInChannel", "").is_handled());
        let outcome = dispatcher.on_notification("CommandOutChannel", "");
        assert!(matches!(
            outcome,
            DispatchOutcome::Failed {
                channel: ChannelId::CommandOut,
                error: SyncError::Store { .. },
            }
        ));
    }
    assert_eq!(routines.results.backlog_len(), 2);

    lake.flush_all().await.unwrap();
    lake.push_json(
        &keys.pending_commands,
        &TwinCommand {
            id: "r3".to_owned(),
            body: json!({"unset": ["n"]}),
        },
    )
    .await
    .unwrap();

    {
        let mut dispatcher = ChannelDispatcher::new(
            &lake,
            Collaborators {
                clock: &mut clock,
                time: &routines.time,
                snapshots: &mut routines.snapshots,
                commands: &mut routines.commands,
                results: &mut routines.results,
            },
            period(),
        );
        assert!(dispatcher.on_notification("CommandInChannel", "").is_handled());
        assert!(dispatcher.on_notification("CommandOutChannel", "").is_handled());
    }
    assert_eq!(routines.results.backlog_len(), 0);

    let results: Vec<CommandResult> = lake.list_json(&keys.command_results).await.unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.command_id.as_str()).collect();
    assert_eq!(ids, vec!["r1", "r2", "r3"]);
}

// =============================================================================
// Bus
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore]
async fn listener_dispatches_published_time() {
    let lake = setup_lake().await;
    let keys = KeyConfig::default();
    let twin = new_twin(0);
    let mut clock = twin.clone();
    let mut routines = LakeRoutines::new(&twin, &keys);

    let listener = BusListener::connect(DATALAKE_URL).await.unwrap();
    let broadcaster = ClockBroadcaster::new(
        lake.clone(),
        keys.published_time.clone(),
        LogicalTime::new(1_000),
        Duration::from_millis(50),
    );
    let publisher = tokio::spawn(broadcaster.run(tokio::time::sleep(Duration::from_millis(600))));

    let mut dispatcher = ChannelDispatcher::new(
        &lake,
        Collaborators {
            clock: &mut clock,
            time: &routines.time,
            snapshots: &mut routines.snapshots,
            commands: &mut routines.commands,
            results: &mut routines.results,
        },
        period(),
    );

    let end = listener
        .run(&mut dispatcher, tokio::time::sleep(Duration::from_millis(800)))
        .await
        .unwrap();
    assert_eq!(end, SessionEnd::Shutdown);

    let stats = dispatcher.stats();
    assert_eq!(stats.subscriptions, 4);
    assert!(stats.handled > 0);
    assert_eq!(stats.failed, 0);
    drop(dispatcher);
    publisher.await.unwrap();

    // Published time started at 1000, so the twin moved at least ten ticks.
    assert!(twin.current_time().unwrap() >= LogicalTime::new(1_000));
}
