//! Order status notifications.
//!
//! Transitions hand a [`StatusNotification`] to a [`Notifier`], which queues it
//! on a bounded channel. A [`Dispatcher`] task drains the channel and pushes
//! each notification to the customer's live connections in the
//! [`ConnectionRegistry`]. Delivery is at most once: a full channel, an absent
//! customer or a slow connection all drop the push and log it.

pub mod dispatcher;
pub mod emitter;
pub mod error;
pub mod notification;
pub mod registry;

pub use dispatcher::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_PUSH_TIMEOUT, Dispatcher};
pub use emitter::Notifier;
pub use error::{NotificationError, Result};
pub use notification::StatusNotification;
pub use registry::{ConnectionRegistry, Subscription};
