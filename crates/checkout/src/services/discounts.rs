//! Discount registry trait and in-memory implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{DiscountCode, DiscountQuote, DiscountRejection, Money, OrderId, normalize_code};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{CheckoutError, Result};

/// A code that passed validation, with its pricing for one subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedDiscount {
    /// Normalized code.
    pub code: String,
    #[serde(flatten)]
    pub quote: DiscountQuote,
}

fn rejected(code: &str, reason: DiscountRejection) -> CheckoutError {
    CheckoutError::InvalidDiscount {
        code: code.to_string(),
        reason,
    }
}

/// Stored discount codes and their usage.
///
/// `apply` is the only operation that consumes a use. It re-checks the cap in
/// the same atomic step that increments it, so `current_uses` never exceeds
/// `max_uses` however many orders race for the last use.
#[async_trait]
pub trait DiscountRegistry: Send + Sync {
    async fn create(&self, code: DiscountCode) -> Result<DiscountCode>;

    async fn get(&self, code: &str) -> Result<Option<DiscountCode>>;

    async fn list(&self) -> Result<Vec<DiscountCode>>;

    async fn set_active(&self, code: &str, active: bool) -> Result<DiscountCode>;

    /// Removes an unused code. Codes with uses are kept.
    async fn delete(&self, code: &str) -> Result<()>;

    /// Consumes one use for `order_id`.
    async fn apply(&self, code: &str, order_id: OrderId) -> Result<()>;

    /// Gives back the use held by `order_id`, if any.
    async fn release(&self, code: &str, order_id: OrderId) -> Result<()>;

    /// Prices `subtotal` with `input` without consuming a use.
    async fn validate(&self, input: &str, subtotal: Money) -> Result<ValidatedDiscount> {
        let code = normalize_code(input)
            .map_err(|_| rejected(input.trim(), DiscountRejection::NotFound))?;
        let stored = self
            .get(&code)
            .await?
            .ok_or_else(|| rejected(&code, DiscountRejection::NotFound))?;
        let quote = stored
            .quote(subtotal)
            .map_err(|reason| rejected(&code, reason))?;
        Ok(ValidatedDiscount { code, quote })
    }
}

/// In-memory discount registry for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDiscountRegistry {
    codes: Arc<RwLock<BTreeMap<String, DiscountCode>>>,
}

impl InMemoryDiscountRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Normalizes `input`, treating a malformed code as one that does not exist.
fn lookup_key(input: &str) -> Option<String> {
    normalize_code(input).ok()
}

#[async_trait]
impl DiscountRegistry for InMemoryDiscountRegistry {
    async fn create(&self, code: DiscountCode) -> Result<DiscountCode> {
        let mut codes = self.codes.write().await;
        if codes.contains_key(&code.code) {
            return Err(domain::DiscountError::AlreadyExists { code: code.code }.into());
        }
        codes.insert(code.code.clone(), code.clone());
        Ok(code)
    }

    async fn get(&self, code: &str) -> Result<Option<DiscountCode>> {
        let Some(key) = lookup_key(code) else {
            return Ok(None);
        };
        Ok(self.codes.read().await.get(&key).cloned())
    }

    async fn list(&self) -> Result<Vec<DiscountCode>> {
        let mut codes: Vec<_> = self.codes.read().await.values().cloned().collect();
        codes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(codes)
    }

    async fn set_active(&self, code: &str, active: bool) -> Result<DiscountCode> {
        let key = lookup_key(code).ok_or_else(|| CheckoutError::not_found("Discount code", code))?;
        let mut codes = self.codes.write().await;
        let stored = codes
            .get_mut(&key)
            .ok_or_else(|| CheckoutError::not_found("Discount code", &key))?;
        stored.is_active = active;
        Ok(stored.clone())
    }

    async fn delete(&self, code: &str) -> Result<()> {
        let key = lookup_key(code).ok_or_else(|| CheckoutError::not_found("Discount code", code))?;
        let mut codes = self.codes.write().await;
        let stored = codes
            .get(&key)
            .ok_or_else(|| CheckoutError::not_found("Discount code", &key))?;
        stored.ensure_deletable()?;
        codes.remove(&key);
        Ok(())
    }

    async fn apply(&self, code: &str, order_id: OrderId) -> Result<()> {
        let key = lookup_key(code).ok_or_else(|| rejected(code, DiscountRejection::NotFound))?;
        let mut codes = self.codes.write().await;
        let stored = codes
            .get_mut(&key)
            .ok_or_else(|| rejected(&key, DiscountRejection::NotFound))?;
        stored
            .record_use(order_id)
            .map_err(|reason| rejected(&key, reason))
    }

    async fn release(&self, code: &str, order_id: OrderId) -> Result<()> {
        let Some(key) = lookup_key(code) else {
            return Ok(());
        };
        if let Some(stored) = self.codes.write().await.get_mut(&key) {
            stored.release_use(order_id);
        }
        Ok(())
    }
}
