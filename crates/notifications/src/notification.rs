use chrono::{DateTime, Utc};
use common::CustomerId;
use domain::{Aggregate, Order, OrderId, OrderStatus};
use serde::{Deserialize, Serialize};

/// Pushed to a customer when one of their orders changes status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusNotification {
    pub customer_id: CustomerId,
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

impl StatusNotification {
    /// Event name used on the wire.
    pub const EVENT: &'static str = "order_status";

    /// Builds the notification for the latest history entry of `order`.
    /// Returns `None` for an order that was never placed.
    pub fn for_order(order: &Order) -> Option<Self> {
        let order_id = order.id()?;
        let customer_id = order.customer_id()?;
        let latest = order.status_history().last()?;
        Some(Self {
            customer_id,
            order_id,
            status: latest.status,
            note: latest.note.clone(),
            at: latest.timestamp,
        })
    }
}
