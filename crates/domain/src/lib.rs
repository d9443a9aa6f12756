//! Order domain: the order aggregate and its status graph, pricing, discount
//! code rules and loyalty balance derivation.

pub mod aggregate;
pub mod command;
pub mod discount;
pub mod error;
pub mod loyalty;
pub mod order;

pub use aggregate::{Aggregate, DomainEvent};
pub use command::{Command, CommandHandler, CommandResult};
pub use common::{AddressId, CustomerId, ProductId};
pub use discount::{DiscountCode, DiscountError, DiscountQuote, DiscountRejection, normalize_code};
pub use error::DomainError;
pub use loyalty::{InsufficientPoints, LoyaltyBalance};
pub use order::{
    ChangeStatus, LineItem, Money, Order, OrderError, OrderEvent, OrderId, OrderService,
    MAX_UNIT_PRICE, OrderStatus, POINT_VALUE, PaymentMethod, PlaceOrder, PlacementDiscount, Pricing,
    ProductSnapshot, StatusEntry, points_earned,
};
