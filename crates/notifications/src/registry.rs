//! Process-local registry of live customer connections.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use common::CustomerId;
use futures_core::Stream;
use tokio::sync::mpsc;

use crate::error::{NotificationError, Result};
use crate::notification::StatusNotification;

/// Pushes buffered per connection before a slow reader starts timing out.
pub const CONNECTION_BUFFER: usize = 16;

type Connections = HashMap<CustomerId, HashMap<u64, mpsc::Sender<StatusNotification>>>;

struct Inner {
    connections: Mutex<Connections>,
    next_id: AtomicU64,
    buffer: usize,
}

/// Live connections keyed by authenticated customer.
///
/// A customer may hold several connections at once. Each one is removed when
/// its [`Subscription`] is dropped.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Inner>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(CONNECTION_BUFFER)
    }
}

impl ConnectionRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                connections: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
            }),
        }
    }

    fn connections(&self) -> MutexGuard<'_, Connections> {
        self.inner
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new connection for `customer_id`.
    pub fn subscribe(&self, customer_id: CustomerId) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.inner.buffer);
        self.connections()
            .entry(customer_id)
            .or_default()
            .insert(id, sender);
        tracing::debug!(%customer_id, connection_id = id, "connection registered");

        Subscription {
            customer_id,
            id,
            registry: self.clone(),
            receiver,
        }
    }

    fn unsubscribe(&self, customer_id: CustomerId, id: u64) {
        let mut connections = self.connections();
        if let Some(entries) = connections.get_mut(&customer_id) {
            entries.remove(&id);
            if entries.is_empty() {
                connections.remove(&customer_id);
            }
        }
        tracing::debug!(%customer_id, connection_id = id, "connection removed");
    }

    pub fn connection_count(&self, customer_id: CustomerId) -> usize {
        self.connections().get(&customer_id).map_or(0, HashMap::len)
    }

    pub fn is_connected(&self, customer_id: CustomerId) -> bool {
        self.connection_count(customer_id) > 0
    }

    /// Sends `notification` to every live connection of its customer.
    ///
    /// Returns how many connections received it. A customer with no
    /// connections is not an error.
    pub async fn push(
        &self,
        notification: &StatusNotification,
        timeout: Duration,
    ) -> Result<usize> {
        let customer_id = notification.customer_id;
        let senders: Vec<_> = self
            .connections()
            .get(&customer_id)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default();

        let mut delivered = 0;
        let mut timed_out = 0;
        for sender in senders {
            match tokio::time::timeout(timeout, sender.send(notification.clone())).await {
                Ok(Ok(())) => delivered += 1,
                // Receiver went away between lookup and send.
                Ok(Err(_)) => {}
                Err(_) => timed_out += 1,
            }
        }

        if timed_out > 0 {
            return Err(NotificationError::PushTimeout {
                customer_id,
                after: timeout,
                timed_out,
            });
        }
        Ok(delivered)
    }
}

/// One live connection. Yields the notifications pushed to it and leaves the
/// registry when dropped.
pub struct Subscription {
    customer_id: CustomerId,
    id: u64,
    registry: ConnectionRegistry,
    receiver: mpsc::Receiver<StatusNotification>,
}

impl Subscription {
    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub async fn recv(&mut self) -> Option<StatusNotification> {
        self.receiver.recv().await
    }
}

impl Stream for Subscription {
    type Item = StatusNotification;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.customer_id, self.id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("customer_id", &self.customer_id)
            .field("id", &self.id)
            .finish()
    }
}
