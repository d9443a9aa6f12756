//! Inventory ledger trait and in-memory implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use domain::{Money, ProductId, ProductSnapshot};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{CheckoutError, Result};

/// A catalog entry with its current stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub image: Option<String>,
    #[serde(default)]
    pub specs: BTreeMap<String, String>,
    pub price: Money,
    pub stock_quantity: u32,
}

impl Product {
    pub fn new(name: impl Into<String>, price: Money, stock_quantity: u32) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            brand: String::new(),
            category: String::new(),
            image: None,
            specs: BTreeMap::new(),
            price,
            stock_quantity,
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = brand.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// The copy frozen onto order lines.
    pub fn snapshot(&self) -> ProductSnapshot {
        ProductSnapshot {
            name: self.name.clone(),
            brand: self.brand.clone(),
            category: self.category.clone(),
            image: self.image.clone(),
            specs: self.specs.clone(),
        }
    }
}

/// Stock levels per product.
///
/// `reserve` must check and decrement in one atomic step: concurrent
/// reservations against stock `k` never take more than `k` units in total.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Looks up a product, failing with `NotFound`.
    async fn product(&self, product_id: ProductId) -> Result<Product>;

    async fn availability(&self, product_id: ProductId) -> Result<u32>;

    /// Takes `quantity` units, or fails with `InsufficientStock` and takes
    /// nothing.
    async fn reserve(&self, product_id: ProductId, quantity: u32) -> Result<()>;

    /// Puts back units taken by an earlier `reserve`.
    async fn release(&self, product_id: ProductId, quantity: u32) -> Result<()>;

    /// Adds stock and returns the new level.
    async fn restock(&self, product_id: ProductId, quantity: u32) -> Result<u32>;

    /// Inserts or replaces a catalog entry.
    async fn upsert_product(&self, product: Product) -> Result<()>;
}

/// In-memory inventory ledger for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryLedger {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
}

impl InMemoryInventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let ledger = Self::new();
        {
            let mut guard = ledger.products.write().await;
            for product in products {
                guard.insert(product.id, product);
            }
        }
        ledger
    }
}

#[async_trait]
impl InventoryLedger for InMemoryInventoryLedger {
    async fn product(&self, product_id: ProductId) -> Result<Product> {
        self.products
            .read()
            .await
            .get(&product_id)
            .cloned()
            .ok_or_else(|| CheckoutError::not_found("Product", product_id))
    }

    async fn availability(&self, product_id: ProductId) -> Result<u32> {
        Ok(self.product(product_id).await?.stock_quantity)
    }

    async fn reserve(&self, product_id: ProductId, quantity: u32) -> Result<()> {
        let mut products = self.products.write().await;
        let product = products
            .get_mut(&product_id)
            .ok_or_else(|| CheckoutError::not_found("Product", product_id))?;

        if product.stock_quantity < quantity {
            return Err(CheckoutError::InsufficientStock {
                product_id,
                available: product.stock_quantity,
                requested: quantity,
            });
        }
        product.stock_quantity -= quantity;
        Ok(())
    }

    async fn release(&self, product_id: ProductId, quantity: u32) -> Result<()> {
        let mut products = self.products.write().await;
        let product = products
            .get_mut(&product_id)
            .ok_or_else(|| CheckoutError::not_found("Product", product_id))?;
        product.stock_quantity = product.stock_quantity.saturating_add(quantity);
        Ok(())
    }

    async fn restock(&self, product_id: ProductId, quantity: u32) -> Result<u32> {
        self.release(product_id, quantity).await?;
        self.availability(product_id).await
    }

    async fn upsert_product(&self, product: Product) -> Result<()> {
        self.products.write().await.insert(product.id, product);
        Ok(())
    }
}
