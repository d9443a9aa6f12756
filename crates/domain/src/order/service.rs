//! Order service: the persistence-facing API for orders.

use chrono::Utc;
use common::CustomerId;
use event_store::{EventStore, EventStoreExt};

use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;
use crate::loyalty::LoyaltyBalance;

use super::{ChangeStatus, Order, OrderId, PlaceOrder};

/// Wraps the command handler with order-specific operations.
pub struct OrderService<S: EventStore> {
    handler: CommandHandler<S, Order>,
}

impl<S: EventStore> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    pub fn handler(&self) -> &CommandHandler<S, Order> {
        &self.handler
    }

    pub fn store(&self) -> &S {
        self.handler.store()
    }

    /// Persists a new order. Fails with a conflict if the id is taken.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, customer_id = %cmd.customer_id))]
    pub async fn place_order(&self, cmd: PlaceOrder) -> Result<CommandResult<Order>, DomainError> {
        let placed_at = Utc::now();
        self.handler
            .handle(&cmd, |order, cmd| order.place(cmd, placed_at))
            .await
    }

    /// Applies one status transition with optimistic concurrency.
    #[tracing::instrument(skip(self))]
    pub async fn change_status(
        &self,
        cmd: ChangeStatus,
    ) -> Result<CommandResult<Order>, DomainError> {
        let changed_at = Utc::now();
        self.handler
            .handle(&cmd, |order, cmd| {
                order.change_status(cmd.status, cmd.note.clone(), changed_at)
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, DomainError> {
        self.handler.load_existing(order_id).await
    }

    /// All orders placed by `customer_id`, most recent first.
    #[tracing::instrument(skip(self))]
    pub async fn orders_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Order>, DomainError> {
        let ids = self
            .store()
            .aggregates_tagged("customer_id", &customer_id.to_string())
            .await?;

        let mut orders = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(order) = self.handler.load_existing(id).await? {
                orders.push(order);
            }
        }
        orders.sort_by(|a, b| b.placed_at().cmp(&a.placed_at()));
        Ok(orders)
    }

    /// Recomputes the customer's loyalty balance from their order history.
    #[tracing::instrument(skip(self))]
    pub async fn loyalty_balance(
        &self,
        customer_id: CustomerId,
    ) -> Result<LoyaltyBalance, DomainError> {
        let orders = self.orders_for_customer(customer_id).await?;
        Ok(LoyaltyBalance::from_orders(&orders))
    }
}
