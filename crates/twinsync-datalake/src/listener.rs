//! Bus listener session.
//!
//! The listener owns a dedicated pub/sub connection, subscribes to the four
//! known channels, and feeds every delivered message to a
//! [`NotificationHandler`] one at a time. It never stops because of a single
//! message: the handler captures per-message failures, and a lagging
//! receiver only loses the messages the bus already dropped.
//!
//! # Session
//!
//! ```text
//! connect --> message_rx --> subscribe x4 (on_subscribed each)
//!                 |
//!                 +--> recv --> on_notification --> recv --> ...
//!                        until shutdown or bus closed
//! ```

use std::future::Future;

use fred::prelude::*;
use fred::types::Message;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use twinsync_core::{ChannelId, NotificationHandler};

use crate::error::{DbError, ListenerError};
use crate::lake::connect_client;

/// Why a listener session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The shutdown future completed.
    Shutdown,
}

/// A pub/sub connection to the data lake bus.
pub struct BusListener {
    client: Client,
}

impl BusListener {
    /// Open a dedicated pub/sub connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Redis`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let client = connect_client(url).await?;
        info!(url = url, "bus listener connected");
        Ok(Self { client })
    }

    /// Subscribe to the known channels and dispatch until `shutdown`
    /// completes or the bus closes.
    ///
    /// The message receiver is registered before subscribing so no message
    /// delivered right after a confirmation is missed. Each confirmed
    /// subscription is reported through [`NotificationHandler::on_subscribed`].
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Subscribe`] if a subscription fails and
    /// [`ListenerError::BusClosed`] if the transport stops delivering.
    pub async fn run<H, F>(&self, handler: &mut H, shutdown: F) -> Result<SessionEnd, ListenerError>
    where
        H: NotificationHandler + ?Sized,
        F: Future<Output = ()>,
    {
        let mut messages = self.client.message_rx();

        for channel in &ChannelId::KNOWN {
            let name = channel.as_str();
            let _: () = self.client.subscribe(name).await.map_err(DbError::from)?;
            handler.on_subscribed(name);
        }

        let end = deliver(&mut messages, handler, shutdown).await?;
        self.unsubscribe_all().await;
        Ok(end)
    }

    async fn unsubscribe_all(&self) {
        for channel in &ChannelId::KNOWN {
            let result: Result<(), _> = self.client.unsubscribe(channel.as_str()).await;
            if let Err(e) = result {
                warn!(channel = %channel, error = %e, "failed to unsubscribe");
            }
        }
    }
}

impl std::fmt::Debug for BusListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusListener").finish_non_exhaustive()
    }
}

/// Feed received messages to `handler` one at a time until `shutdown`
/// completes or the sender side closes.
///
/// A lagging receiver logs how many messages the bus dropped and keeps
/// delivering from the oldest message still buffered.
pub(crate) async fn deliver<H, F>(
    messages: &mut Receiver<Message>,
    handler: &mut H,
    shutdown: F,
) -> Result<SessionEnd, ListenerError>
where
    H: NotificationHandler + ?Sized,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("listener shutting down");
                return Ok(SessionEnd::Shutdown);
            }
            received = messages.recv() => match received {
                Ok(message) => {
                    let channel: &str = &message.channel;
                    let payload = payload_text(&message.value);
                    handler.on_notification(channel, &payload);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "listener lagged behind the bus, notifications dropped");
                }
                Err(RecvError::Closed) => return Err(ListenerError::BusClosed),
            },
        }
    }
}

/// Render a message body as text. Non-text bodies become empty strings;
/// handlers treat the payload as a trigger only.
pub(crate) fn payload_text(value: &Value) -> String {
    value.as_string().unwrap_or_default()
}
