//! Checkout error types.

use std::time::Duration;

use domain::{
    DiscountError, DiscountRejection, DomainError, InsufficientPoints, OrderError, OrderStatus,
    ProductId,
};
use event_store::EventStoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Everything a checkout or status operation can fail with.
///
/// Business errors carry enough detail to be shown to the caller as is.
/// `Conflict`, `Timeout` and `Storage` are infrastructure failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Insufficient stock for product {product_id}: {available} available, {requested} requested")]
    InsufficientStock {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    #[error("Invalid discount code {code}: {reason}")]
    InvalidDiscount {
        code: String,
        reason: DiscountRejection,
    },

    #[error("Insufficient loyalty points: {current} available, {requested} requested")]
    InsufficientLoyaltyPoints {
        current: i64,
        requested: u32,
        point_value: i64,
    },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
        allowed: Vec<OrderStatus>,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CheckoutError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CheckoutError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckoutError::Validation(_) => "validation",
            CheckoutError::InsufficientStock { .. } => "insufficient_stock",
            CheckoutError::InvalidDiscount { .. } => "invalid_discount",
            CheckoutError::InsufficientLoyaltyPoints { .. } => "insufficient_loyalty_points",
            CheckoutError::InvalidTransition { .. } => "invalid_transition",
            CheckoutError::NotFound { .. } => "not_found",
            CheckoutError::Forbidden(_) => "forbidden",
            CheckoutError::Conflict(_) => "conflict",
            CheckoutError::Timeout { .. } => "timeout",
            CheckoutError::Storage(_) => "storage",
        }
    }

    /// Business rejections are final and never retried.
    pub fn is_business(&self) -> bool {
        !matches!(
            self,
            CheckoutError::Conflict(_) | CheckoutError::Timeout { .. } | CheckoutError::Storage(_)
        )
    }
}

impl From<OrderError> for CheckoutError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidTransition { from, to, allowed } => {
                CheckoutError::InvalidTransition { from, to, allowed }
            }
            OrderError::AlreadyPlaced => CheckoutError::Conflict(err.to_string()),
            other => CheckoutError::Validation(other.to_string()),
        }
    }
}

impl From<EventStoreError> for CheckoutError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::ConcurrencyConflict { .. } => CheckoutError::Conflict(err.to_string()),
            other => CheckoutError::Storage(other.to_string()),
        }
    }
}

impl From<DomainError> for CheckoutError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::EventStore(e) => e.into(),
            DomainError::Order(e) => e.into(),
            DomainError::AggregateNotFound {
                aggregate_type,
                aggregate_id,
            } => CheckoutError::NotFound {
                entity: aggregate_type,
                id: aggregate_id,
            },
            DomainError::Serialization(e) => CheckoutError::Storage(e.to_string()),
        }
    }
}

impl From<DiscountError> for CheckoutError {
    fn from(err: DiscountError) -> Self {
        match err {
            DiscountError::AlreadyExists { .. } | DiscountError::InUse { .. } => {
                CheckoutError::Conflict(err.to_string())
            }
            other => CheckoutError::Validation(other.to_string()),
        }
    }
}

impl From<InsufficientPoints> for CheckoutError {
    fn from(err: InsufficientPoints) -> Self {
        CheckoutError::InsufficientLoyaltyPoints {
            current: err.current,
            requested: err.requested,
            point_value: err.point_value,
        }
    }
}

impl From<sqlx::Error> for CheckoutError {
    fn from(err: sqlx::Error) -> Self {
        CheckoutError::Storage(err.to_string())
    }
}
