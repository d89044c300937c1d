//! Data lake layer for twinsync.
//!
//! The data lake is a Redis-compatible server that both stores the twin's
//! exchanged state and carries the pub/sub bus. This crate provides the
//! connection handle, the bus listener that drives a dispatcher, and
//! store-backed implementations of the synchronization routines.
//!
//! # Architecture
//!
//! ```text
//! Bus (pub/sub connection)
//!     |
//!     +-- BusListener --> ChannelDispatcher (twinsync-core)
//!                              |
//!                              +-- SnapshotPersister --> twin:snapshots
//!                              +-- CommandApplier <----- twin:commands:pending
//!                              +-- ResultPersister ----> twin:commands:results
//!                              +-- PublishedTimeReader <- datalake:time
//!
//! ClockBroadcaster --> datalake:time + TimeChannel
//! ```
//!
//! # Modules
//!
//! - [`lake`] -- Connection handle and typed key operations
//! - [`routines`] -- Store-backed synchronization routines
//! - [`listener`] -- Subscription session driving a notification handler
//! - [`broadcaster`] -- Periodic external time publisher
//! - [`error`] -- Shared error types

pub mod broadcaster;
pub mod error;
pub mod lake;
pub mod listener;
pub mod routines;

pub use broadcaster::ClockBroadcaster;
pub use error::{DbError, ListenerError};
pub use lake::DataLakePool;
pub use listener::{BusListener, SessionEnd};
pub use routines::{CommandApplier, LakeRoutines, PublishedTimeReader, ResultPersister, SnapshotPersister};
