//! Order aggregate implementation.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::{AddressId, AggregateId, CustomerId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

use super::{
    LineItem, Money, OrderError, OrderEvent, OrderStatus, PaymentMethod, PlaceOrder, Pricing,
    StatusEntry,
    events::{OrderPlacedData, StatusChangedData},
};

/// Orders are identified by their stream id.
pub type OrderId = AggregateId;

/// Order aggregate root.
///
/// Line items and pricing are frozen by `OrderPlaced`. After that only the
/// status moves, and each move appends one history entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<OrderId>,

    #[serde(default)]
    version: Version,

    customer_id: Option<CustomerId>,
    line_items: Vec<LineItem>,
    shipping_address_id: Option<AddressId>,
    payment_method: Option<PaymentMethod>,
    subtotal: Money,
    discount_code: Option<String>,
    discount_amount: Money,
    loyalty_points_used: u32,
    loyalty_points_earned: u32,
    total_amount: Money,
    status: OrderStatus,
    status_history: Vec<StatusEntry>,
    placed_at: Option<DateTime<Utc>>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderPlaced(data) => self.apply_placed(data),
            OrderEvent::StatusChanged(data) => self.apply_status_changed(data),
        }
    }

    fn tags(&self) -> Vec<(&'static str, String)> {
        self.customer_id
            .map(|customer_id| vec![("customer_id", customer_id.to_string())])
            .unwrap_or_default()
    }
}

// Query methods
impl Order {
    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn shipping_address_id(&self) -> Option<AddressId> {
        self.shipping_address_id
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn discount_code(&self) -> Option<&str> {
        self.discount_code.as_deref()
    }

    pub fn discount_amount(&self) -> Money {
        self.discount_amount
    }

    pub fn loyalty_points_used(&self) -> u32 {
        self.loyalty_points_used
    }

    pub fn loyalty_points_earned(&self) -> u32 {
        self.loyalty_points_earned
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Audit trail, oldest first. The first entry is always `pending` and the
    /// last one matches [`Order::status`].
    pub fn status_history(&self) -> &[StatusEntry] {
        &self.status_history
    }

    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.placed_at
    }

    /// Statuses an admin may move this order to next.
    pub fn legal_next_statuses(&self) -> &'static [OrderStatus] {
        if self.id.is_none() {
            return &[];
        }
        self.status.allowed_next()
    }

    pub fn is_owned_by(&self, customer_id: CustomerId) -> bool {
        self.customer_id == Some(customer_id)
    }

    pub fn contains_product(&self, product_id: common::ProductId) -> bool {
        self.line_items
            .iter()
            .any(|item| item.product_id == product_id)
    }
}

// Command methods (return events)
impl Order {
    /// Prices and freezes a new order.
    pub fn place(&self, cmd: &PlaceOrder, at: DateTime<Utc>) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyPlaced);
        }
        if cmd.line_items.is_empty() {
            return Err(OrderError::NoItems);
        }

        let mut seen = HashSet::new();
        for item in &cmd.line_items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id,
                });
            }
            if item.unit_price.is_negative() {
                return Err(OrderError::InvalidPrice {
                    product_id: item.product_id,
                    price: item.unit_price,
                });
            }
            if !seen.insert(item.product_id) {
                return Err(OrderError::DuplicateLine {
                    product_id: item.product_id,
                });
            }
        }

        let pricing = Pricing::compute(
            &cmd.line_items,
            cmd.discount.as_ref().map(|d| d.percent),
            cmd.loyalty_points_used,
        )?;

        Ok(vec![OrderEvent::OrderPlaced(OrderPlacedData {
            order_id: cmd.order_id,
            customer_id: cmd.customer_id,
            line_items: cmd.line_items.clone(),
            shipping_address_id: cmd.shipping_address_id,
            payment_method: cmd.payment_method,
            subtotal: pricing.subtotal,
            discount_code: cmd.discount.as_ref().map(|d| d.code.clone()),
            discount_amount: pricing.discount_amount,
            loyalty_points_used: pricing.loyalty_points_used,
            loyalty_points_earned: pricing.loyalty_points_earned,
            total_amount: pricing.total_amount,
            placed_at: at,
        })])
    }

    /// Moves the order to `to`, recording `note` in the history.
    ///
    /// Only edges of the status graph are accepted; re-entering the current
    /// status, skipping ahead and leaving a terminal status all fail.
    pub fn change_status(
        &self,
        to: OrderStatus,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_none() {
            return Err(OrderError::NotPlaced);
        }
        if !self.status.can_transition_to(to) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to,
                allowed: self.status.allowed_next().to_vec(),
            });
        }

        Ok(vec![OrderEvent::status_changed(self.status, to, note, at)])
    }
}

// Event application
impl Order {
    fn apply_placed(&mut self, data: OrderPlacedData) {
        self.id = Some(data.order_id);
        self.customer_id = Some(data.customer_id);
        self.line_items = data.line_items;
        self.shipping_address_id = Some(data.shipping_address_id);
        self.payment_method = Some(data.payment_method);
        self.subtotal = data.subtotal;
        self.discount_code = data.discount_code;
        self.discount_amount = data.discount_amount;
        self.loyalty_points_used = data.loyalty_points_used;
        self.loyalty_points_earned = data.loyalty_points_earned;
        self.total_amount = data.total_amount;
        self.status = OrderStatus::Pending;
        self.status_history = vec![StatusEntry {
            status: OrderStatus::Pending,
            timestamp: data.placed_at,
            note: None,
        }];
        self.placed_at = Some(data.placed_at);
    }

    fn apply_status_changed(&mut self, data: StatusChangedData) {
        self.status = data.to;
        self.status_history.push(StatusEntry {
            status: data.to,
            timestamp: data.changed_at,
            note: data.note,
        });
    }
}

#[cfg(test)]
mod tests {
    use common::ProductId;

    use super::*;
    use crate::order::{POINT_VALUE, ProductSnapshot};

    fn line(price: i64, quantity: u32) -> LineItem {
        LineItem::new(
            ProductId::new(),
            quantity,
            Money::new(price),
            ProductSnapshot {
                name: "Keyboard".to_string(),
                brand: "Acme".to_string(),
                category: "peripherals".to_string(),
                image: None,
                specs: Default::default(),
            },
        )
    }

    fn place_cmd(lines: Vec<LineItem>) -> PlaceOrder {
        PlaceOrder::new(CustomerId::new(), lines, AddressId::new(), PaymentMethod::Cod)
    }

    fn placed(cmd: &PlaceOrder) -> Order {
        let mut order = Order::default();
        let events = order.place(cmd, Utc::now()).unwrap();
        order.apply_events(events);
        order
    }

    fn advance(order: &mut Order, to: OrderStatus) {
        let events = order.change_status(to, None, Utc::now()).unwrap();
        order.apply_events(events);
    }

    #[test]
    fn place_freezes_pricing_and_starts_pending() {
        let cmd = place_cmd(vec![line(200_000, 2), line(100_000, 1)]).with_loyalty_points(3);
        let order = placed(&cmd);

        assert_eq!(order.id(), Some(cmd.order_id));
        assert_eq!(order.customer_id(), Some(cmd.customer_id));
        assert_eq!(order.subtotal(), Money::new(500_000));
        assert_eq!(order.discount_amount(), Money::zero());
        assert_eq!(
            order.total_amount(),
            Money::new(500_000 - 3 * POINT_VALUE)
        );
        assert_eq!(order.loyalty_points_earned(), 49);
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.status_history().len(), 1);
        assert_eq!(order.status_history()[0].status, OrderStatus::Pending);
    }

    #[test]
    fn place_applies_discount() {
        let cmd = place_cmd(vec![line(500_000, 1)]).with_discount("SAVE2024", 20);
        let order = placed(&cmd);

        assert_eq!(order.discount_code(), Some("SAVE2024"));
        assert_eq!(order.discount_amount(), Money::new(100_000));
        assert_eq!(order.total_amount(), Money::new(400_000));
        assert_eq!(order.loyalty_points_earned(), 40);
    }

    #[test]
    fn place_rejects_bad_input() {
        let empty = Order::default().place(&place_cmd(vec![]), Utc::now());
        assert_eq!(empty.unwrap_err(), OrderError::NoItems);

        let zero = Order::default().place(&place_cmd(vec![line(1_000, 0)]), Utc::now());
        assert!(matches!(zero, Err(OrderError::InvalidQuantity { .. })));

        let item = line(1_000, 1);
        let dup = Order::default().place(&place_cmd(vec![item.clone(), item]), Utc::now());
        assert!(matches!(dup, Err(OrderError::DuplicateLine { .. })));
    }

    #[test]
    fn place_twice_is_rejected() {
        let cmd = place_cmd(vec![line(1_000, 1)]);
        let order = placed(&cmd);
        assert_eq!(
            order.place(&cmd, Utc::now()).unwrap_err(),
            OrderError::AlreadyPlaced
        );
    }

    #[test]
    fn full_walk_then_cancel_fails() {
        let mut order = placed(&place_cmd(vec![line(1_000, 1)]));
        advance(&mut order, OrderStatus::Confirmed);
        advance(&mut order, OrderStatus::Shipping);
        advance(&mut order, OrderStatus::Delivered);

        let err = order
            .change_status(OrderStatus::Cancelled, None, Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Cancelled,
                allowed: vec![],
            }
        );

        let statuses: Vec<_> = order.status_history().iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                OrderStatus::Pending,
                OrderStatus::Confirmed,
                OrderStatus::Shipping,
                OrderStatus::Delivered,
            ]
        );
        assert_eq!(order.status_history().last().unwrap().status, order.status());
    }

    #[test]
    fn invalid_transition_lists_legal_next_states() {
        let order = placed(&place_cmd(vec![line(1_000, 1)]));
        let err = order
            .change_status(OrderStatus::Shipping, None, Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::Shipping,
                allowed: vec![OrderStatus::Confirmed, OrderStatus::Cancelled],
            }
        );
    }

    #[test]
    fn same_status_is_not_a_transition() {
        let order = placed(&place_cmd(vec![line(1_000, 1)]));
        assert!(
            order
                .change_status(OrderStatus::Pending, None, Utc::now())
                .is_err()
        );
    }

    #[test]
    fn notes_are_kept_in_history() {
        let mut order = placed(&place_cmd(vec![line(1_000, 1)]));
        let events = order
            .change_status(
                OrderStatus::Cancelled,
                Some("customer called".to_string()),
                Utc::now(),
            )
            .unwrap();
        order.apply_events(events);

        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(
            order.status_history()[1].note.as_deref(),
            Some("customer called")
        );
        assert!(order.legal_next_statuses().is_empty());
    }

    #[test]
    fn unplaced_order_cannot_change_status() {
        assert_eq!(
            Order::default()
                .change_status(OrderStatus::Confirmed, None, Utc::now())
                .unwrap_err(),
            OrderError::NotPlaced
        );
    }

    #[test]
    fn events_are_tagged_with_the_customer() {
        let cmd = place_cmd(vec![line(1_000, 1)]);
        let order = placed(&cmd);
        assert_eq!(
            order.tags(),
            vec![("customer_id", cmd.customer_id.to_string())]
        );
        assert!(Order::default().tags().is_empty());
    }
}
