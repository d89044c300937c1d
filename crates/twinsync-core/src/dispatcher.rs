//! Channel dispatcher.
//!
//! The dispatcher is the single consumer of bus notifications. For each one
//! it parses the channel into a [`ChannelId`], runs exactly one handler, and
//! turns the result into a [`DispatchOutcome`]. Failures are captured per
//! call and never leave [`ChannelDispatcher::dispatch`], so a bad command or
//! a transient store error cannot end the listening session.
//!
//! # Routing
//!
//! | Channel | Handler |
//! |---------|---------|
//! | `DTOutChannel` | [`SnapshotSync::persist_current_snapshot`] |
//! | `CommandInChannel` | [`CommandSync::apply_pending_commands`] |
//! | `CommandOutChannel` | [`CommandResultSync::persist_command_results`] |
//! | `TimeChannel` | [`compute_and_apply_ticks`] against the published time |
//! | anything else | none, outcome is [`DispatchOutcome::Ignored`] |

use tracing::{error, info, warn};

use crate::channel::{ChannelId, Notification};
use crate::clock::{compute_and_apply_ticks, ClockSource, TickPeriod};
use crate::sync::{CommandResultSync, CommandSync, SnapshotSync, SyncError, TimePublisher};

/// The two callbacks a bus transport drives.
///
/// `on_subscribed` carries no ordering guarantee relative to
/// `on_notification`: notifications may arrive before every subscription
/// has been confirmed.
pub trait NotificationHandler {
    /// Handle one delivered message.
    fn on_notification(&mut self, channel: &str, payload: &str) -> DispatchOutcome;

    /// Record that the transport confirmed a subscription.
    fn on_subscribed(&mut self, channel: &str);
}

/// Result of handling a single notification. Used for observability only.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The routine for a known channel completed.
    Handled {
        /// Channel that was handled.
        channel: ChannelId,
    },
    /// The channel is not one of the known four; nothing ran.
    Ignored {
        /// Raw channel name as received.
        channel: String,
    },
    /// The routine for a known channel failed.
    Failed {
        /// Channel whose routine failed.
        channel: ChannelId,
        /// Cause of the failure.
        error: SyncError,
    },
}

impl DispatchOutcome {
    /// Whether the notification was handled successfully.
    pub const fn is_handled(&self) -> bool {
        matches!(self, Self::Handled { .. })
    }

    /// Whether the notification was ignored.
    pub const fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored { .. })
    }

    /// Whether the notification's routine failed.
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Running counters for one listener session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Notifications whose routine completed.
    pub handled: u64,
    /// Notifications on unknown channels.
    pub ignored: u64,
    /// Notifications whose routine failed.
    pub failed: u64,
    /// Subscription confirmations received.
    pub subscriptions: u64,
}

impl DispatchStats {
    const fn record(&mut self, outcome: &DispatchOutcome) {
        let counter = match outcome {
            DispatchOutcome::Handled { .. } => &mut self.handled,
            DispatchOutcome::Ignored { .. } => &mut self.ignored,
            DispatchOutcome::Failed { .. } => &mut self.failed,
        };
        *counter = counter.saturating_add(1);
    }

    /// Total notifications seen.
    pub const fn total(&self) -> u64 {
        self.handled
            .saturating_add(self.ignored)
            .saturating_add(self.failed)
    }
}

/// The collaborators a dispatcher routes to, borrowed for the session.
pub struct Collaborators<'a, S: ?Sized> {
    /// The twin's clock.
    pub clock: &'a mut dyn ClockSource,
    /// Reader for the externally published time.
    pub time: &'a dyn TimePublisher<S>,
    /// Outbound-snapshot routine.
    pub snapshots: &'a mut dyn SnapshotSync<S>,
    /// Inbound-command routine.
    pub commands: &'a mut dyn CommandSync<S>,
    /// Command-result routine.
    pub results: &'a mut dyn CommandResultSync<S>,
}

/// Routes bus notifications to synchronization routines.
///
/// Owns no persistent state. The store handle and all collaborators are
/// borrowed for the lifetime of the listener session.
pub struct ChannelDispatcher<'a, S: ?Sized> {
    store: &'a S,
    collaborators: Collaborators<'a, S>,
    tick_period: TickPeriod,
    stats: DispatchStats,
}

impl<'a, S: ?Sized> ChannelDispatcher<'a, S> {
    /// Create a dispatcher over `store` and its collaborators.
    pub fn new(
        store: &'a S,
        collaborators: Collaborators<'a, S>,
        tick_period: TickPeriod,
    ) -> Self {
        Self {
            store,
            collaborators,
            tick_period,
            stats: DispatchStats::default(),
        }
    }

    /// Counters accumulated so far.
    pub const fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Tick period used for the time channel.
    pub const fn tick_period(&self) -> TickPeriod {
        self.tick_period
    }

    /// Handle a parsed notification.
    pub fn dispatch(&mut self, notification: &Notification) -> DispatchOutcome {
        let channel = &notification.channel;
        let result = match channel {
            ChannelId::OutSnapshot => self
                .collaborators
                .snapshots
                .persist_current_snapshot(self.store),
            ChannelId::CommandIn => self
                .collaborators
                .commands
                .apply_pending_commands(self.store),
            ChannelId::CommandOut => self
                .collaborators
                .results
                .persist_command_results(self.store),
            ChannelId::Time => self.sync_time(),
            ChannelId::Unknown(name) => {
                warn!(channel = %name, "received message on unknown channel");
                let outcome = DispatchOutcome::Ignored {
                    channel: name.clone(),
                };
                self.stats.record(&outcome);
                return outcome;
            }
        };

        let outcome = match result {
            Ok(()) => {
                info!(channel = %channel, "{}", handled_message(channel));
                DispatchOutcome::Handled {
                    channel: channel.clone(),
                }
            }
            Err(e) => {
                error!(channel = %channel, error = %e, "error handling notification");
                DispatchOutcome::Failed {
                    channel: channel.clone(),
                    error: e,
                }
            }
        };
        self.stats.record(&outcome);
        outcome
    }

    /// Read both clocks and advance the twin toward the published time.
    fn sync_time(&mut self) -> Result<(), SyncError> {
        let external = self.collaborators.time.read_published_time(self.store)?;
        let twin = self.collaborators.clock.current_time()?;
        compute_and_apply_ticks(
            &mut *self.collaborators.clock,
            external,
            twin,
            self.tick_period,
        )?;
        Ok(())
    }
}

impl<S: ?Sized> NotificationHandler for ChannelDispatcher<'_, S> {
    fn on_notification(&mut self, channel: &str, payload: &str) -> DispatchOutcome {
        self.dispatch(&Notification::from_wire(channel, payload))
    }

    fn on_subscribed(&mut self, channel: &str) {
        self.stats.subscriptions = self.stats.subscriptions.saturating_add(1);
        info!(channel = channel, "client is subscribed to channel");
    }
}

const fn handled_message(channel: &ChannelId) -> &'static str {
    match channel {
        ChannelId::OutSnapshot => "new output snapshot saved",
        ChannelId::CommandIn => "new commands received",
        ChannelId::CommandOut => "new command results saved",
        ChannelId::Time => "twin clock synchronized",
        ChannelId::Unknown(_) => "ignored",
    }
}
