//! Collaborators consumed by order placement.

pub mod addresses;
pub mod discounts;
pub mod inventory;
pub mod postgres;

pub use addresses::{Address, AddressBook, InMemoryAddressBook};
pub use discounts::{DiscountRegistry, InMemoryDiscountRegistry, ValidatedDiscount};
pub use inventory::{InMemoryInventoryLedger, InventoryLedger, Product};
pub use postgres::{PgAddressBook, PgDiscountRegistry, PgInventoryLedger};
