//! HTTP route handlers.

pub mod addresses;
pub mod discounts;
pub mod health;
pub mod loyalty;
pub mod metrics;
pub mod notifications;
pub mod orders;
pub mod products;
pub mod purchases;
