//! Background task that drains the notification channel.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::emitter::Notifier;
use crate::notification::StatusNotification;
use crate::registry::ConnectionRegistry;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// Pushes queued notifications to live connections, one at a time.
pub struct Dispatcher {
    receiver: mpsc::Receiver<StatusNotification>,
    registry: ConnectionRegistry,
    push_timeout: Duration,
}

impl Dispatcher {
    /// Creates the channel shared by a [`Notifier`] and its dispatcher.
    pub fn channel(
        registry: ConnectionRegistry,
        capacity: usize,
        push_timeout: Duration,
    ) -> (Notifier, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let dispatcher = Self {
            receiver,
            registry,
            push_timeout,
        };
        (Notifier::new(sender), dispatcher)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until every [`Notifier`] has been dropped.
    pub async fn run(mut self) {
        tracing::info!(push_timeout_ms = self.push_timeout.as_millis() as u64, "notification dispatcher started");
        while let Some(notification) = self.receiver.recv().await {
            self.dispatch(notification).await;
        }
        tracing::info!("notification dispatcher stopped");
    }

    #[tracing::instrument(
        skip(self, notification),
        fields(customer_id = %notification.customer_id, order_id = %notification.order_id, status = %notification.status)
    )]
    async fn dispatch(&self, notification: StatusNotification) {
        match self.registry.push(&notification, self.push_timeout).await {
            Ok(0) => tracing::debug!("customer not connected, push skipped"),
            Ok(delivered) => {
                metrics::counter!("notifications_delivered_total").increment(delivered as u64);
                tracing::debug!(delivered, "notification pushed");
            }
            Err(e) => {
                metrics::counter!("notifications_dropped_total", "reason" => "push_timeout")
                    .increment(1);
                tracing::warn!(error = %e, "notification push failed");
            }
        }
    }
}
