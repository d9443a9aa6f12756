//! Order engine: the single entry point for placing orders, moving them
//! through the status graph and administering discounts and stock.

use std::sync::Arc;
use std::time::Duration;

use domain::{
    AddressId, Aggregate, ChangeStatus, CustomerId, DiscountCode, DomainError, LoyaltyBalance, Money, Order,
    MAX_UNIT_PRICE, OrderError, OrderId, OrderService, OrderStatus, ProductId,
};
use event_store::EventStore;
use notifications::{Notifier, StatusNotification};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::{CheckoutError, Result};
use crate::loyalty::LoyaltyLedger;
use crate::placement::{OrderPlacement, PlacementRequest};
use crate::services::{
    Address, AddressBook, DiscountRegistry, InMemoryAddressBook, InMemoryDiscountRegistry,
    InMemoryInventoryLedger, InventoryLedger, PgAddressBook, PgDiscountRegistry,
    PgInventoryLedger, Product, ValidatedDiscount,
};
use crate::timeout::bounded;

pub const DEFAULT_PERSISTENCE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Upper bound for each call to a store.
    pub persistence_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            persistence_timeout: DEFAULT_PERSISTENCE_TIMEOUT,
        }
    }
}

/// The stores the engine works with besides the order streams.
#[derive(Clone)]
pub struct Collaborators {
    pub inventory: Arc<dyn InventoryLedger>,
    pub discounts: Arc<dyn DiscountRegistry>,
    pub addresses: Arc<dyn AddressBook>,
}

impl Collaborators {
    pub fn in_memory() -> Self {
        Self {
            inventory: Arc::new(InMemoryInventoryLedger::new()),
            discounts: Arc::new(InMemoryDiscountRegistry::new()),
            addresses: Arc::new(InMemoryAddressBook::new()),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            inventory: Arc::new(PgInventoryLedger::new(pool.clone())),
            discounts: Arc::new(PgDiscountRegistry::new(pool.clone())),
            addresses: Arc::new(PgAddressBook::new(pool)),
        }
    }
}

/// Where an order stands and where it may go next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transitions {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub allowed: Vec<OrderStatus>,
}

pub struct OrderEngine<S: EventStore> {
    orders: Arc<OrderService<S>>,
    placement: OrderPlacement<S>,
    loyalty: LoyaltyLedger<S>,
    collaborators: Collaborators,
    notifier: Notifier,
    config: EngineConfig,
}

impl<S: EventStore> OrderEngine<S> {
    pub fn new(
        store: S,
        collaborators: Collaborators,
        notifier: Notifier,
        config: EngineConfig,
    ) -> Self {
        let orders = Arc::new(OrderService::new(store));
        let placement = OrderPlacement::new(
            Arc::clone(&orders),
            Arc::clone(&collaborators.inventory),
            Arc::clone(&collaborators.discounts),
            Arc::clone(&collaborators.addresses),
            config.persistence_timeout,
        );
        let loyalty = LoyaltyLedger::new(Arc::clone(&orders), config.persistence_timeout);

        Self {
            orders,
            placement,
            loyalty,
            collaborators,
            notifier,
            config,
        }
    }

    pub fn store(&self) -> &S {
        self.orders.store()
    }

    pub fn inventory(&self) -> &dyn InventoryLedger {
        self.collaborators.inventory.as_ref()
    }

    pub fn discounts(&self) -> &dyn DiscountRegistry {
        self.collaborators.discounts.as_ref()
    }

    pub fn addresses(&self) -> &dyn AddressBook {
        self.collaborators.addresses.as_ref()
    }

    async fn bounded<T, E>(
        &self,
        operation: &'static str,
        future: impl Future<Output = std::result::Result<T, E>>,
    ) -> Result<T>
    where
        CheckoutError: From<E>,
    {
        bounded(operation, self.config.persistence_timeout, future).await
    }

    // --- orders ---

    pub async fn place_order(
        &self,
        customer_id: CustomerId,
        request: PlacementRequest,
    ) -> Result<Order> {
        self.placement.place(customer_id, request).await
    }

    /// Moves an order to `status`. Only edges of the status graph are
    /// accepted, and a concurrent writer on the same order gets `Conflict`.
    /// The customer is notified once the change is stored.
    #[tracing::instrument(skip(self, note), fields(%order_id, to = %status))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        note: Option<String>,
    ) -> Result<Order> {
        let mut cmd = ChangeStatus::new(order_id, status);
        cmd.note = note.filter(|n| !n.trim().is_empty());

        let result = self
            .bounded("status update", async {
                self.orders
                    .change_status(cmd)
                    .await
                    .map_err(|e| order_error(order_id, e))
            })
            .await;

        let order = match result {
            Ok(result) => result.aggregate,
            Err(e) => {
                metrics::counter!("order_status_rejections_total", "reason" => e.kind()).increment(1);
                tracing::warn!(reason = e.kind(), error = %e, "status update rejected");
                return Err(e);
            }
        };

        metrics::counter!("order_status_transitions_total", "to" => status.as_str()).increment(1);
        tracing::info!(version = %order.version(), "order status changed");

        if let Some(notification) = StatusNotification::for_order(&order) {
            self.notifier.notify(notification);
        }
        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.bounded("order lookup", self.orders.get_order(order_id))
            .await?
            .ok_or_else(|| CheckoutError::not_found("Order", order_id))
    }

    /// Reads an order on behalf of a customer, who must own it.
    pub async fn get_customer_order(
        &self,
        customer_id: CustomerId,
        order_id: OrderId,
    ) -> Result<Order> {
        let order = self.get_order(order_id).await?;
        if !order.is_owned_by(customer_id) {
            return Err(CheckoutError::Forbidden(format!(
                "order {order_id} does not belong to customer {customer_id}"
            )));
        }
        Ok(order)
    }

    pub async fn orders_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>> {
        self.bounded(
            "customer orders",
            self.orders.orders_for_customer(customer_id),
        )
        .await
    }

    pub async fn legal_transitions(&self, order_id: OrderId) -> Result<Transitions> {
        let order = self.get_order(order_id).await?;
        Ok(Transitions {
            order_id,
            status: order.status(),
            allowed: order.legal_next_statuses().to_vec(),
        })
    }

    // --- loyalty ---

    pub async fn loyalty_balance(&self, customer_id: CustomerId) -> Result<LoyaltyBalance> {
        self.loyalty.balance(customer_id).await
    }

    // --- discounts ---

    /// Prices `subtotal` with `code` without consuming a use.
    pub async fn validate_discount(&self, code: &str, subtotal: Money) -> Result<ValidatedDiscount> {
        if subtotal.is_negative() {
            return Err(CheckoutError::Validation(
                "subtotal must not be negative".to_string(),
            ));
        }
        self.bounded("discount validation", self.discounts().validate(code, subtotal))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_discount(
        &self,
        code: &str,
        percent: u32,
        max_uses: u32,
    ) -> Result<DiscountCode> {
        let code = DiscountCode::new(code, percent, max_uses)?;
        let created = self
            .bounded("discount create", self.discounts().create(code))
            .await?;
        tracing::info!(code = %created.code, percent = created.percent, max_uses = created.max_uses, "discount code created");
        Ok(created)
    }

    pub async fn list_discounts(&self) -> Result<Vec<DiscountCode>> {
        self.bounded("discount list", self.discounts().list()).await
    }

    pub async fn get_discount(&self, code: &str) -> Result<DiscountCode> {
        self.bounded("discount lookup", self.discounts().get(code))
            .await?
            .ok_or_else(|| CheckoutError::not_found("Discount code", code.trim()))
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_discount_active(&self, code: &str, active: bool) -> Result<DiscountCode> {
        self.bounded("discount update", self.discounts().set_active(code, active))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_discount(&self, code: &str) -> Result<()> {
        self.bounded("discount delete", self.discounts().delete(code))
            .await?;
        tracing::info!("discount code deleted");
        Ok(())
    }

    // --- inventory ---

    pub async fn product(&self, product_id: ProductId) -> Result<Product> {
        self.bounded("product lookup", self.inventory().product(product_id))
            .await
    }

    pub async fn upsert_product(&self, product: Product) -> Result<Product> {
        if product.price.is_negative() {
            return Err(CheckoutError::Validation(
                "price must not be negative".to_string(),
            ));
        }
        if product.price > MAX_UNIT_PRICE {
            return Err(CheckoutError::Validation(format!(
                "price must not exceed {MAX_UNIT_PRICE}"
            )));
        }
        self.bounded("product upsert", self.inventory().upsert_product(product.clone()))
            .await?;
        Ok(product)
    }

    /// Adds `quantity` units and returns the new stock level.
    #[tracing::instrument(skip(self))]
    pub async fn restock(&self, product_id: ProductId, quantity: u32) -> Result<u32> {
        if quantity == 0 {
            return Err(CheckoutError::Validation(
                "restock quantity must be at least 1".to_string(),
            ));
        }
        let stock = self
            .bounded("restock", self.inventory().restock(product_id, quantity))
            .await?;
        tracing::info!(stock, "product restocked");
        Ok(stock)
    }

    // --- addresses ---

    pub async fn register_address(&self, customer_id: CustomerId, label: String) -> Result<Address> {
        self.bounded("address register", self.addresses().register(customer_id, label))
            .await
    }

    pub async fn addresses_for(&self, customer_id: CustomerId) -> Result<Vec<Address>> {
        self.bounded("address list", self.addresses().list(customer_id))
            .await
    }

    pub async fn resolve_address(
        &self,
        customer_id: CustomerId,
        address_id: AddressId,
    ) -> Result<Address> {
        self.bounded("address lookup", self.addresses().resolve(customer_id, address_id))
            .await
    }
}

/// Status changes on an unknown order are `NotFound`, not a validation error.
fn order_error(order_id: OrderId, err: DomainError) -> CheckoutError {
    match err {
        DomainError::Order(OrderError::NotPlaced) => CheckoutError::not_found("Order", order_id),
        other => other.into(),
    }
}
