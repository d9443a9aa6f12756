//! Read models built from order events.
//!
//! - [`LoyaltyBalanceView`] keeps a running loyalty balance per customer and
//!   can be reconciled against a full recomputation.
//! - [`VerifiedPurchasesView`] answers whether a customer has received a
//!   product, for review eligibility.
//!
//! Views are fed by a [`ProjectionProcessor`] that replays the event store.

pub mod error;
pub mod processor;
pub mod projection;
pub mod read_model;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use read_model::ReadModel;
pub use views::{LoyaltyBalanceView, Reconciliation, VerifiedPurchasesView};
