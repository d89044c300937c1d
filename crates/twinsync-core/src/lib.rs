//! Channel dispatch and clock synchronization between a live twin and the
//! shared data lake.
//!
//! A long-lived listener receives `(channel, payload)` notifications from the
//! bus and hands each one to a [`ChannelDispatcher`]. The dispatcher routes the
//! notification to exactly one synchronization routine (or to the
//! time-advance computation), captures any failure as a [`DispatchOutcome`],
//! and keeps listening.
//!
//! # Modules
//!
//! - [`channel`] -- Wire channel names and the closed [`ChannelId`] set.
//! - [`clock`] -- Logical time, tick periods, the [`ClockSource`] contract,
//!   and the time-advance computation.
//! - [`sync`] -- Contracts for the three synchronization routines and the
//!   external time reader.
//! - [`dispatcher`] -- The [`ChannelDispatcher`] and [`NotificationHandler`].
//! - [`twin`] -- Twin model contract, JSON envelopes, and a small reference
//!   twin.
//! - [`config`] -- YAML configuration loading and validation.
//!
//! [`ChannelId`]: channel::ChannelId
//! [`ClockSource`]: clock::ClockSource
//! [`ChannelDispatcher`]: dispatcher::ChannelDispatcher
//! [`DispatchOutcome`]: dispatcher::DispatchOutcome
//! [`NotificationHandler`]: dispatcher::NotificationHandler

pub mod channel;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod sync;
pub mod twin;

pub use channel::{ChannelId, Notification};
pub use clock::{ClockError, ClockSource, LogicalTime, TickCount, TickPeriod};
pub use dispatcher::{ChannelDispatcher, Collaborators, DispatchOutcome, DispatchStats, NotificationHandler};
pub use sync::{CommandResultSync, CommandSync, SnapshotSync, SyncError, TimePublisher};
