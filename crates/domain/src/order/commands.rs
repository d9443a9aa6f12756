//! Order commands.

use common::{AddressId, AggregateId, CustomerId};
use serde::{Deserialize, Serialize};

use crate::command::Command;

use super::{LineItem, Order, OrderStatus, PaymentMethod};

/// A validated discount to price into a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementDiscount {
    /// Normalized code.
    pub code: String,
    pub percent: u8,
}

/// Records a new order. Stock, discount and loyalty checks have already
/// passed by the time this runs; the aggregate only prices and freezes it.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub order_id: AggregateId,
    pub customer_id: CustomerId,
    pub line_items: Vec<LineItem>,
    pub shipping_address_id: AddressId,
    pub payment_method: PaymentMethod,
    pub discount: Option<PlacementDiscount>,
    pub loyalty_points_used: u32,
}

impl PlaceOrder {
    pub fn new(
        customer_id: CustomerId,
        line_items: Vec<LineItem>,
        shipping_address_id: AddressId,
        payment_method: PaymentMethod,
    ) -> Self {
        Self {
            order_id: AggregateId::new(),
            customer_id,
            line_items,
            shipping_address_id,
            payment_method,
            discount: None,
            loyalty_points_used: 0,
        }
    }

    pub fn with_discount(mut self, code: impl Into<String>, percent: u8) -> Self {
        self.discount = Some(PlacementDiscount {
            code: code.into(),
            percent,
        });
        self
    }

    pub fn with_loyalty_points(mut self, points: u32) -> Self {
        self.loyalty_points_used = points;
        self
    }
}

impl Command for PlaceOrder {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}

/// Moves an order along the status graph.
#[derive(Debug, Clone)]
pub struct ChangeStatus {
    pub order_id: AggregateId,
    pub status: OrderStatus,
    pub note: Option<String>,
}

impl ChangeStatus {
    pub fn new(order_id: AggregateId, status: OrderStatus) -> Self {
        Self {
            order_id,
            status,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl Command for ChangeStatus {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}
