//! Order domain events.

use chrono::{DateTime, Utc};
use common::{AddressId, AggregateId, CustomerId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{LineItem, Money, OrderStatus, PaymentMethod};

/// Events recorded on an order stream.
///
/// A stream always starts with exactly one `OrderPlaced`; every later event is
/// a `StatusChanged`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    OrderPlaced(OrderPlacedData),
    StatusChanged(StatusChangedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::StatusChanged(_) => "OrderStatusChanged",
        }
    }
}

/// Everything frozen at placement time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: AggregateId,
    pub customer_id: CustomerId,
    pub line_items: Vec<LineItem>,
    pub shipping_address_id: AddressId,
    pub payment_method: PaymentMethod,
    pub subtotal: Money,
    pub discount_code: Option<String>,
    pub discount_amount: Money,
    pub loyalty_points_used: u32,
    pub loyalty_points_earned: u32,
    pub total_amount: Money,
    pub placed_at: DateTime<Utc>,
}

/// A move along the status graph. The status and its history entry are
/// recorded together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub note: Option<String>,
    pub changed_at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn status_changed(
        from: OrderStatus,
        to: OrderStatus,
        note: Option<String>,
        changed_at: DateTime<Utc>,
    ) -> Self {
        OrderEvent::StatusChanged(StatusChangedData {
            from,
            to,
            note,
            changed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types() {
        let event =
            OrderEvent::status_changed(OrderStatus::Pending, OrderStatus::Confirmed, None, Utc::now());
        assert_eq!(event.event_type(), "OrderStatusChanged");
    }

    #[test]
    fn status_change_payload_shape() {
        let event = OrderEvent::status_changed(
            OrderStatus::Shipping,
            OrderStatus::Delivered,
            Some("left at door".to_string()),
            Utc::now(),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "StatusChanged");
        assert_eq!(json["data"]["from"], "shipping");
        assert_eq!(json["data"]["to"], "delivered");
        assert_eq!(json["data"]["note"], "left at door");
    }
}
