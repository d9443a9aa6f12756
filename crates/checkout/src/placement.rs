//! Order placement saga.
//!
//! Placement touches three stores: stock, discount usage and the order stream.
//! Each side effect pushes its undo onto a [`Compensations`] stack. If a later
//! step fails, the stack is unwound in reverse before the error is returned,
//! so a rejected order leaves stock and discount usage exactly as it found
//! them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use domain::{
    AddressId, Aggregate, CustomerId, LineItem, Money, Order, OrderId, OrderService, PaymentMethod,
    PlaceOrder, Pricing, ProductId,
};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};
use crate::loyalty::LoyaltyLedger;
use crate::services::{AddressBook, DiscountRegistry, InventoryLedger, ValidatedDiscount};
use crate::timeout::bounded;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// What a customer submits to place an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub line_items: Vec<LineRequest>,
    pub shipping_address_id: AddressId,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub discount_code: Option<String>,
    #[serde(default)]
    pub loyalty_points_used: u32,
}

impl PlacementRequest {
    pub fn new(
        line_items: Vec<LineRequest>,
        shipping_address_id: AddressId,
        payment_method: PaymentMethod,
    ) -> Self {
        Self {
            line_items,
            shipping_address_id,
            payment_method,
            discount_code: None,
            loyalty_points_used: 0,
        }
    }

    pub fn with_discount_code(mut self, code: impl Into<String>) -> Self {
        self.discount_code = Some(code.into());
        self
    }

    pub fn with_loyalty_points(mut self, points: u32) -> Self {
        self.loyalty_points_used = points;
        self
    }

    /// Checks line quantities and folds repeated products into one line,
    /// keeping first-seen order.
    pub fn merged_lines(&self) -> Result<Vec<LineRequest>> {
        if self.line_items.is_empty() {
            return Err(CheckoutError::Validation(
                "order must contain at least one line item".to_string(),
            ));
        }

        let mut merged: Vec<LineRequest> = Vec::with_capacity(self.line_items.len());
        for line in &self.line_items {
            if line.quantity == 0 {
                return Err(CheckoutError::Validation(format!(
                    "quantity for product {} must be at least 1",
                    line.product_id
                )));
            }
            match merged.iter_mut().find(|m| m.product_id == line.product_id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.checked_add(line.quantity).ok_or_else(|| {
                        CheckoutError::Validation(format!(
                            "quantity for product {} is too large",
                            line.product_id
                        ))
                    })?;
                }
                None => merged.push(*line),
            }
        }
        Ok(merged)
    }

    /// The discount code, ignoring a blank one.
    fn discount_code(&self) -> Option<&str> {
        self.discount_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }
}

/// One undo step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    ReleaseStock { product_id: ProductId, quantity: u32 },
    ReleaseDiscount { code: String, order_id: OrderId },
}

impl Compensation {
    fn kind(&self) -> &'static str {
        match self {
            Compensation::ReleaseStock { .. } => "release_stock",
            Compensation::ReleaseDiscount { .. } => "release_discount",
        }
    }
}

/// Undo steps recorded so far, newest last.
#[derive(Debug, Default)]
pub struct Compensations {
    steps: Vec<Compensation>,
}

impl Compensations {
    pub fn push(&mut self, step: Compensation) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Compensation] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step newest first. A failing step is logged and the rest
    /// still run. Returns how many steps failed.
    pub async fn unwind(
        self,
        inventory: &dyn InventoryLedger,
        discounts: &dyn DiscountRegistry,
    ) -> usize {
        let mut failed = 0;
        for step in self.steps.into_iter().rev() {
            let result = match &step {
                Compensation::ReleaseStock {
                    product_id,
                    quantity,
                } => inventory.release(*product_id, *quantity).await,
                Compensation::ReleaseDiscount { code, order_id } => {
                    discounts.release(code, *order_id).await
                }
            };

            match result {
                Ok(()) => {
                    metrics::counter!("placement_compensations_total", "step" => step.kind(), "outcome" => "ok")
                        .increment(1);
                    tracing::info!(step = step.kind(), ?step, "compensation applied");
                }
                Err(e) => {
                    failed += 1;
                    metrics::counter!("placement_compensations_total", "step" => step.kind(), "outcome" => "failed")
                        .increment(1);
                    tracing::error!(step = step.kind(), ?step, error = %e, "compensation failed");
                }
            }
        }
        failed
    }
}

/// Places orders: validate, reserve stock, check discount and points, commit
/// the discount use, persist the order.
pub struct OrderPlacement<S: EventStore> {
    orders: Arc<OrderService<S>>,
    inventory: Arc<dyn InventoryLedger>,
    discounts: Arc<dyn DiscountRegistry>,
    addresses: Arc<dyn AddressBook>,
    loyalty: LoyaltyLedger<S>,
    timeout: Duration,
}

impl<S: EventStore> OrderPlacement<S> {
    pub fn new(
        orders: Arc<OrderService<S>>,
        inventory: Arc<dyn InventoryLedger>,
        discounts: Arc<dyn DiscountRegistry>,
        addresses: Arc<dyn AddressBook>,
        timeout: Duration,
    ) -> Self {
        let loyalty = LoyaltyLedger::new(Arc::clone(&orders), timeout);
        Self {
            orders,
            inventory,
            discounts,
            addresses,
            loyalty,
            timeout,
        }
    }

    /// Places one order for `customer_id`. On any failure every side effect
    /// already made is undone before the error is returned, except when a
    /// timed out append can be neither confirmed nor ruled out.
    #[tracing::instrument(
        skip(self, request),
        fields(%customer_id, lines = request.line_items.len(), discount = request.discount_code.is_some())
    )]
    pub async fn place(&self, customer_id: CustomerId, request: PlacementRequest) -> Result<Order> {
        let start = Instant::now();
        let result = self.run(customer_id, &request).await;
        metrics::histogram!("order_placement_duration_seconds").record(start.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("orders_placed_total").increment(1);
                tracing::info!(
                    order_id = ?order.id(),
                    total_amount = %order.total_amount(),
                    points_earned = order.loyalty_points_earned(),
                    "order placed"
                );
            }
            Err(e) => {
                metrics::counter!("orders_rejected_total", "reason" => e.kind()).increment(1);
                tracing::warn!(reason = e.kind(), error = %e, "order placement rejected");
            }
        }
        result
    }

    async fn run(&self, customer_id: CustomerId, request: &PlacementRequest) -> Result<Order> {
        let lines = request.merged_lines()?;
        bounded(
            "address lookup",
            self.timeout,
            self.addresses.resolve(customer_id, request.shipping_address_id),
        )
        .await?;

        let mut compensations = Compensations::default();
        match self
            .commit(customer_id, request, lines, &mut compensations)
            .await
        {
            Ok(order) => Ok(order),
            Err(e) => {
                if !compensations.is_empty() {
                    tracing::warn!(
                        steps = compensations.steps().len(),
                        reason = e.kind(),
                        "placement failed, compensating"
                    );
                    compensations
                        .unwind(self.inventory.as_ref(), self.discounts.as_ref())
                        .await;
                }
                Err(e)
            }
        }
    }

    async fn commit(
        &self,
        customer_id: CustomerId,
        request: &PlacementRequest,
        lines: Vec<LineRequest>,
        compensations: &mut Compensations,
    ) -> Result<Order> {
        let mut line_items = Vec::with_capacity(lines.len());
        for line in lines {
            let product = bounded(
                "product lookup",
                self.timeout,
                self.inventory.product(line.product_id),
            )
            .await?;

            self.inventory.reserve(line.product_id, line.quantity).await?;
            compensations.push(Compensation::ReleaseStock {
                product_id: line.product_id,
                quantity: line.quantity,
            });
            tracing::debug!(step = "reserve_stock", product_id = %line.product_id, quantity = line.quantity, "stock reserved");

            line_items.push(LineItem::new(
                product.id,
                line.quantity,
                product.price,
                product.snapshot(),
            ));
        }

        let subtotal = Pricing::subtotal(&line_items)?;
        let discount = match request.discount_code() {
            Some(code) => Some(self.validate_discount(code, subtotal).await?),
            None => None,
        };

        let points = request.loyalty_points_used;
        self.loyalty.spend(customer_id, points).await?;
        Pricing::compute(&line_items, discount.as_ref().map(|d| d.quote.percent), points)?;

        let mut cmd = PlaceOrder::new(
            customer_id,
            line_items,
            request.shipping_address_id,
            request.payment_method,
        )
        .with_loyalty_points(points);

        if let Some(discount) = discount {
            // Release is a no-op unless the use was linked to this order.
            compensations.push(Compensation::ReleaseDiscount {
                code: discount.code.clone(),
                order_id: cmd.order_id,
            });
            bounded(
                "discount apply",
                self.timeout,
                self.discounts.apply(&discount.code, cmd.order_id),
            )
            .await?;
            tracing::debug!(step = "apply_discount", code = %discount.code, "discount use committed");
            cmd = cmd.with_discount(discount.code, discount.quote.percent);
        }

        let order_id = cmd.order_id;
        match bounded("order persistence", self.timeout, self.orders.place_order(cmd)).await {
            Ok(placed) => Ok(placed.aggregate),
            Err(e @ CheckoutError::Timeout { .. }) => {
                self.settle_unacknowledged(order_id, e, compensations).await
            }
            Err(e) => Err(e),
        }
    }

    /// A timed out append may still have committed. Re-reads the stream and
    /// only leaves the compensations in place when the order is known to be
    /// absent.
    async fn settle_unacknowledged(
        &self,
        order_id: OrderId,
        timeout: CheckoutError,
        compensations: &mut Compensations,
    ) -> Result<Order> {
        match bounded("order recheck", self.timeout, self.orders.get_order(order_id)).await {
            Ok(Some(order)) => {
                metrics::counter!("placement_unacknowledged_total", "outcome" => "persisted")
                    .increment(1);
                tracing::warn!(%order_id, "order persisted despite append timeout");
                Ok(order)
            }
            Ok(None) => {
                metrics::counter!("placement_unacknowledged_total", "outcome" => "absent")
                    .increment(1);
                Err(timeout)
            }
            Err(recheck) => {
                let held = std::mem::take(compensations);
                metrics::counter!("placement_unacknowledged_total", "outcome" => "unknown")
                    .increment(1);
                tracing::error!(
                    %order_id,
                    error = %recheck,
                    held = ?held.steps(),
                    "order outcome unknown, reservations kept"
                );
                Err(timeout)
            }
        }
    }

    async fn validate_discount(&self, code: &str, subtotal: Money) -> Result<ValidatedDiscount> {
        bounded(
            "discount validation",
            self.timeout,
            self.discounts.validate(code, subtotal),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(lines: &[(ProductId, u32)]) -> PlacementRequest {
        PlacementRequest::new(
            lines
                .iter()
                .map(|(product_id, quantity)| LineRequest {
                    product_id: *product_id,
                    quantity: *quantity,
                })
                .collect(),
            AddressId::new(),
            PaymentMethod::Cod,
        )
    }

    #[test]
    fn repeated_products_are_merged() {
        let a = ProductId::new();
        let b = ProductId::new();
        let merged = request(&[(a, 1), (b, 2), (a, 3)]).merged_lines().unwrap();

        assert_eq!(
            merged,
            vec![
                LineRequest { product_id: a, quantity: 4 },
                LineRequest { product_id: b, quantity: 2 },
            ]
        );
    }

    #[test]
    fn empty_and_zero_quantity_lines_are_rejected() {
        assert_eq!(request(&[]).merged_lines().unwrap_err().kind(), "validation");
        assert_eq!(
            request(&[(ProductId::new(), 0)]).merged_lines().unwrap_err().kind(),
            "validation"
        );
    }

    #[test]
    fn blank_discount_code_is_ignored() {
        let req = request(&[(ProductId::new(), 1)]).with_discount_code("   ");
        assert_eq!(req.discount_code(), None);
        let req = req.with_discount_code(" save2024 ");
        assert_eq!(req.discount_code(), Some("save2024"));
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let json = serde_json::json!({
            "line_items": [{ "product_id": ProductId::new(), "quantity": 2 }],
            "shipping_address_id": AddressId::new(),
            "payment_method": "banking",
        });
        let req: PlacementRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.payment_method, PaymentMethod::Banking);
        assert_eq!(req.discount_code, None);
        assert_eq!(req.loyalty_points_used, 0);
    }
}
