//! Hands notifications to the dispatcher without ever blocking the caller.

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::{NotificationError, Result};
use crate::notification::StatusNotification;

/// Sending half of the notification channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: mpsc::Sender<StatusNotification>,
}

impl Notifier {
    pub(crate) fn new(sender: mpsc::Sender<StatusNotification>) -> Self {
        Self { sender }
    }

    /// A notifier with no dispatcher behind it. Every notification is dropped.
    pub fn disabled() -> Self {
        let (sender, _) = mpsc::channel(1);
        Self { sender }
    }

    /// Queues `notification`, failing if the channel is full or closed.
    pub fn try_notify(&self, notification: StatusNotification) -> Result<()> {
        self.sender.try_send(notification).map_err(|e| match e {
            TrySendError::Full(_) => NotificationError::ChannelFull,
            TrySendError::Closed(_) => NotificationError::ChannelClosed,
        })
    }

    /// Queues `notification`. Failures are logged and swallowed so that a
    /// committed transition is never reported as failed.
    pub fn notify(&self, notification: StatusNotification) {
        let customer_id = notification.customer_id;
        let order_id = notification.order_id;
        match self.try_notify(notification) {
            Ok(()) => {}
            Err(NotificationError::ChannelFull) => {
                metrics::counter!("notifications_dropped_total", "reason" => "channel_full")
                    .increment(1);
                tracing::warn!(%customer_id, %order_id, "notification channel full, dropping push");
            }
            Err(e) => {
                metrics::counter!("notifications_dropped_total", "reason" => "channel_closed")
                    .increment(1);
                tracing::debug!(%customer_id, %order_id, error = %e, "notification dropped");
            }
        }
    }
}
