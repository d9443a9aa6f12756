//! Running loyalty balance per customer.
//!
//! Kept alongside the on-demand recomputation so the two can be compared.
//! Points move into the balance only when an order is delivered.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{CustomerId, LoyaltyBalance, OrderEvent, OrderId, OrderStatus};
use event_store::EventEnvelope;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;
use crate::error::ProjectionError;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

/// Projected balance next to a full recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub customer_id: CustomerId,
    pub projected: LoyaltyBalance,
    pub recomputed: LoyaltyBalance,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.projected == self.recomputed
    }

    /// `projected - recomputed` available points.
    pub fn drift(&self) -> i64 {
        self.projected.available() - self.recomputed.available()
    }
}

#[derive(Debug, Clone, Copy)]
struct PlacedOrder {
    customer_id: CustomerId,
    earned: u32,
    used: u32,
}

#[derive(Default)]
struct LoyaltyState {
    orders: HashMap<OrderId, PlacedOrder>,
    balances: HashMap<CustomerId, LoyaltyBalance>,
    position: ProjectionPosition,
}

#[derive(Clone, Default)]
pub struct LoyaltyBalanceView {
    state: Arc<RwLock<LoyaltyState>>,
}

impl LoyaltyBalanceView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn balance(&self, customer_id: CustomerId) -> LoyaltyBalance {
        self.state
            .read()
            .await
            .balances
            .get(&customer_id)
            .copied()
            .unwrap_or_default()
    }

    /// Compares the running balance with `recomputed`, which should come
    /// from the customer's full order history.
    pub async fn reconcile(
        &self,
        customer_id: CustomerId,
        recomputed: LoyaltyBalance,
    ) -> Reconciliation {
        let reconciliation = Reconciliation {
            customer_id,
            projected: self.balance(customer_id).await,
            recomputed,
        };
        if !reconciliation.is_consistent() {
            metrics::counter!("loyalty_reconciliation_mismatches_total").increment(1);
            tracing::warn!(
                %customer_id,
                projected = reconciliation.projected.available(),
                recomputed = recomputed.available(),
                "loyalty balance drift"
            );
        }
        reconciliation
    }
}

#[async_trait]
impl Projection for LoyaltyBalanceView {
    fn name(&self) -> &'static str {
        "LoyaltyBalanceView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;
        state.position = state.position.advance();
        if event.aggregate_type != "Order" {
            return Ok(());
        }

        let order_id = event.aggregate_id;
        match serde_json::from_value::<OrderEvent>(event.payload.clone())? {
            OrderEvent::OrderPlaced(data) => {
                state.orders.insert(
                    order_id,
                    PlacedOrder {
                        customer_id: data.customer_id,
                        earned: data.loyalty_points_earned,
                        used: data.loyalty_points_used,
                    },
                );
            }
            OrderEvent::StatusChanged(data) if data.to == OrderStatus::Delivered => {
                let order = state.orders.get(&order_id).copied().ok_or_else(|| {
                    ProjectionError::Inconsistent {
                        aggregate_id: order_id,
                        reason: "delivered before placed".to_string(),
                    }
                })?;
                state
                    .balances
                    .entry(order.customer_id)
                    .or_default()
                    .record_delivery(order.earned, order.used);
            }
            OrderEvent::StatusChanged(_) => {}
        }
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        *self.state.write().await = LoyaltyState::default();
        Ok(())
    }
}

impl ReadModel for LoyaltyBalanceView {
    fn name(&self) -> &'static str {
        "LoyaltyBalanceView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.balances.len()).unwrap_or(0)
    }
}
