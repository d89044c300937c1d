//! Bus channel identifiers.
//!
//! The wire format is string based: publishers announce work by sending any
//! message on one of four well-known channels. Inside the crate the name is
//! parsed once into a closed [`ChannelId`] so dispatch never compares raw
//! strings.
//!
//! | Wire name | Variant | Direction |
//! |-----------|---------|-----------|
//! | `DTOutChannel` | [`ChannelId::OutSnapshot`] | twin state leaving the twin |
//! | `CommandInChannel` | [`ChannelId::CommandIn`] | commands entering the twin |
//! | `CommandOutChannel` | [`ChannelId::CommandOut`] | command results leaving the twin |
//! | `TimeChannel` | [`ChannelId::Time`] | external clock moved |

use std::fmt;

/// Wire name of the outbound-snapshot channel.
pub const DT_OUT_CHANNEL: &str = "DTOutChannel";

/// Wire name of the command-result channel.
pub const COMMAND_OUT_CHANNEL: &str = "CommandOutChannel";

/// Wire name of the inbound-command channel.
pub const COMMAND_IN_CHANNEL: &str = "CommandInChannel";

/// Wire name of the time channel.
pub const TIME_CHANNEL: &str = "TimeChannel";

/// Identifier of a bus channel.
///
/// The four known channels are matched by exact, case-sensitive value.
/// Anything else becomes [`ChannelId::Unknown`], which keeps the raw name
/// for logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelId {
    /// `DTOutChannel`: persist the twin's current snapshot.
    OutSnapshot,
    /// `CommandInChannel`: apply pending commands to the twin.
    CommandIn,
    /// `CommandOutChannel`: persist command results.
    CommandOut,
    /// `TimeChannel`: advance the twin clock toward the published time.
    Time,
    /// Any unrecognized channel name.
    Unknown(String),
}

impl ChannelId {
    /// Every channel the listener subscribes to, in routing priority order.
    pub const KNOWN: [Self; 4] = [Self::OutSnapshot, Self::CommandIn, Self::CommandOut, Self::Time];

    /// Parse a wire channel name.
    ///
    /// Never fails: unrecognized names map to [`ChannelId::Unknown`].
    pub fn parse(name: &str) -> Self {
        match name {
            DT_OUT_CHANNEL => Self::OutSnapshot,
            COMMAND_IN_CHANNEL => Self::CommandIn,
            COMMAND_OUT_CHANNEL => Self::CommandOut,
            TIME_CHANNEL => Self::Time,
            other => Self::Unknown(other.to_owned()),
        }
    }

    /// Return the wire name of this channel.
    pub fn as_str(&self) -> &str {
        match self {
            Self::OutSnapshot => DT_OUT_CHANNEL,
            Self::CommandIn => COMMAND_IN_CHANNEL,
            Self::CommandOut => COMMAND_OUT_CHANNEL,
            Self::Time => TIME_CHANNEL,
            Self::Unknown(name) => name,
        }
    }

    /// Whether this is one of the four known channels.
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message delivered by the bus.
///
/// Created by the transport for every delivered message, consumed once by
/// the dispatcher, then dropped. Never persisted or replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Channel the message arrived on.
    pub channel: ChannelId,
    /// Raw message body. Opaque to the dispatcher.
    pub payload: String,
}

impl Notification {
    /// Build a notification from the raw wire channel name and payload.
    pub fn from_wire(channel: &str, payload: impl Into<String>) -> Self {
        Self {
            channel: ChannelId::parse(channel),
            payload: payload.into(),
        }
    }
}
