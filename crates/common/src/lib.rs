//! Identifier types shared across the order transaction engine crates.

mod ids;

pub use ids::{AddressId, AggregateId, CustomerId, ParseIdError, ProductId};
