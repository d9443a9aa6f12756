pub mod loyalty;
pub mod verified_purchases;

pub use loyalty::{LoyaltyBalanceView, Reconciliation};
pub use verified_purchases::VerifiedPurchasesView;
