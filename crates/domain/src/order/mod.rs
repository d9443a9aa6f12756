//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod pricing;
mod service;
mod state;
mod value_objects;

pub use aggregate::{Order, OrderId};
pub use commands::{ChangeStatus, PlaceOrder, PlacementDiscount};
pub use events::{OrderEvent, OrderPlacedData, StatusChangedData};
pub use pricing::{
    EARN_RATE_PERCENT, MAX_UNIT_PRICE, POINT_VALUE, Pricing, points_earned, points_value,
};
pub use service::OrderService;
pub use state::OrderStatus;
pub use value_objects::{LineItem, Money, PaymentMethod, ProductSnapshot, StatusEntry};

use common::ProductId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("Order already placed")]
    AlreadyPlaced,

    #[error("Order has not been placed")]
    NotPlaced,

    #[error("Order has no line items")]
    NoItems,

    #[error("Invalid quantity for product {product_id}: must be at least 1")]
    InvalidQuantity { product_id: ProductId },

    #[error("Invalid price for product {product_id}: {price}")]
    InvalidPrice { product_id: ProductId, price: Money },

    #[error("Product {product_id} appears on more than one line")]
    DuplicateLine { product_id: ProductId },

    #[error("Order amount exceeds the supported range")]
    AmountOverflow,

    #[error("{points} points are worth {value}, more than the payable {payable}")]
    PointsExceedTotal {
        points: u32,
        value: Money,
        payable: Money,
    },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
        /// Legal next states from `from`.
        allowed: Vec<OrderStatus>,
    },
}
