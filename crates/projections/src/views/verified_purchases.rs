//! Which customers have received which products.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{CustomerId, OrderEvent, OrderId, OrderStatus, ProductId};
use event_store::EventEnvelope;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

#[derive(Default)]
struct PurchasesState {
    /// Placed orders: owner and products.
    orders: HashMap<OrderId, (CustomerId, Vec<ProductId>)>,
    /// First delivered order per (customer, product).
    delivered: HashMap<(CustomerId, ProductId), OrderId>,
    position: ProjectionPosition,
}

/// A purchase is verified once an order containing the product has been
/// delivered to the customer.
#[derive(Clone, Default)]
pub struct VerifiedPurchasesView {
    state: Arc<RwLock<PurchasesState>>,
}

impl VerifiedPurchasesView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn has_purchased(&self, customer_id: CustomerId, product_id: ProductId) -> bool {
        self.verifying_order(customer_id, product_id).await.is_some()
    }

    /// The delivered order that proves the purchase, if any.
    pub async fn verifying_order(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
    ) -> Option<OrderId> {
        self.state
            .read()
            .await
            .delivered
            .get(&(customer_id, product_id))
            .copied()
    }
}

#[async_trait]
impl Projection for VerifiedPurchasesView {
    fn name(&self) -> &'static str {
        "VerifiedPurchasesView"
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
                let products = data.line_items.iter().map(|line| line.product_id).collect();
                state.orders.insert(order_id, (data.customer_id, products));
            }
            OrderEvent::StatusChanged(data) if data.to == OrderStatus::Delivered => {
                let Some((customer_id, products)) = state.orders.get(&order_id).cloned() else {
                    tracing::warn!(%order_id, "delivery for unknown order ignored");
                    return Ok(());
                };
                for product_id in products {
                    state
                        .delivered
                        .entry((customer_id, product_id))
                        .or_insert(order_id);
                }
            }
            OrderEvent::StatusChanged(_) => {}
        }
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        *self.state.write().await = PurchasesState::default();
        Ok(())
    }
}

impl ReadModel for VerifiedPurchasesView {
    fn name(&self) -> &'static str {
        "VerifiedPurchasesView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.delivered.len()).unwrap_or(0)
    }
}
