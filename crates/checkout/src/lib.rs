//! Order checkout: placing orders as a compensating saga over stock, discount
//! usage and the order stream, plus the status and admin operations around
//! them.
//!
//! [`OrderEngine`] is the entry point. The stores it depends on sit behind
//! the traits in [`services`], with in-memory and Postgres implementations.

pub mod engine;
pub mod error;
pub mod loyalty;
pub mod placement;
pub mod services;
mod timeout;

pub use engine::{Collaborators, DEFAULT_PERSISTENCE_TIMEOUT, EngineConfig, OrderEngine, Transitions};
pub use error::{CheckoutError, Result};
pub use loyalty::LoyaltyLedger;
pub use placement::{
    Compensation, Compensations, LineRequest, OrderPlacement, PlacementRequest,
};
pub use services::{
    Address, AddressBook, DiscountRegistry, InMemoryAddressBook, InMemoryDiscountRegistry,
    InMemoryInventoryLedger, InventoryLedger, PgAddressBook, PgDiscountRegistry,
    PgInventoryLedger, Product, ValidatedDiscount,
};
