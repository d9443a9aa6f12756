use std::time::Duration;

use common::CustomerId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NotificationError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    #[error("Notification channel is full")]
    ChannelFull,

    #[error("Notification channel is closed")]
    ChannelClosed,

    #[error("Push to customer {customer_id} timed out after {after:?} on {timed_out} connection(s)")]
    PushTimeout {
        customer_id: CustomerId,
        after: Duration,
        timed_out: usize,
    },
}
