//! Loyalty balance reads for checkout.

use std::sync::Arc;
use std::time::Duration;

use domain::{CustomerId, LoyaltyBalance, OrderService};
use event_store::EventStore;

use crate::error::Result;
use crate::timeout::bounded;

/// Derives balances from the customer's order history on every call.
pub struct LoyaltyLedger<S: EventStore> {
    orders: Arc<OrderService<S>>,
    timeout: Duration,
}

impl<S: EventStore> Clone for LoyaltyLedger<S> {
    fn clone(&self) -> Self {
        Self {
            orders: Arc::clone(&self.orders),
            timeout: self.timeout,
        }
    }
}

impl<S: EventStore> LoyaltyLedger<S> {
    pub fn new(orders: Arc<OrderService<S>>, timeout: Duration) -> Self {
        Self { orders, timeout }
    }

    #[tracing::instrument(skip(self))]
    pub async fn balance(&self, customer_id: CustomerId) -> Result<LoyaltyBalance> {
        bounded(
            "loyalty balance",
            self.timeout,
            self.orders.loyalty_balance(customer_id),
        )
        .await
    }

    /// Checks that `requested` points are covered by a freshly derived balance.
    #[tracing::instrument(skip(self))]
    pub async fn spend(&self, customer_id: CustomerId, requested: u32) -> Result<()> {
        if requested == 0 {
            return Ok(());
        }
        let balance = self.balance(customer_id).await?;
        balance.check_spend(requested)?;
        Ok(())
    }
}
