//! Loyalty balance derived from order history.
//!
//! Only delivered orders count, both for points earned and points used. Points
//! spent on an order that is later cancelled are therefore never debited.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::{Order, OrderStatus, POINT_VALUE};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Insufficient loyalty points: {current} available, {requested} requested")]
pub struct InsufficientPoints {
    pub current: i64,
    pub requested: u32,
    pub point_value: i64,
}

/// Points earned and used over a customer's delivered orders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyBalance {
    pub earned: i64,
    pub used: i64,
    pub delivered_orders: u32,
}

impl LoyaltyBalance {
    /// Recomputes the balance from scratch.
    pub fn from_orders<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Self {
        orders
            .into_iter()
            .filter(|order| order.status() == OrderStatus::Delivered)
            .fold(Self::default(), |mut balance, order| {
                balance.record_delivery(order.loyalty_points_earned(), order.loyalty_points_used());
                balance
            })
    }

    pub fn record_delivery(&mut self, earned: u32, used: u32) {
        self.earned += i64::from(earned);
        self.used += i64::from(used);
        self.delivered_orders += 1;
    }

    /// Spendable points. Can be negative when several orders spent the same
    /// points before any of them was delivered.
    pub fn available(&self) -> i64 {
        self.earned - self.used
    }

    pub fn check_spend(&self, requested: u32) -> Result<(), InsufficientPoints> {
        if i64::from(requested) > self.available() {
            return Err(InsufficientPoints {
                current: self.available(),
                requested,
                point_value: POINT_VALUE,
            });
        }
        Ok(())
    }
}
