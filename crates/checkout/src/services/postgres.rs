//! Postgres implementations of the checkout collaborators.
//!
//! Stock and discount usage change through single conditional `UPDATE`
//! statements, so the check and the write can never interleave with another
//! request.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    AddressId, CustomerId, DiscountCode, DiscountError, DiscountRejection, Money, OrderId,
    ProductId, normalize_code,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::addresses::{Address, AddressBook, owned_by};
use super::discounts::DiscountRegistry;
use super::inventory::{InventoryLedger, Product};
use crate::error::{CheckoutError, Result};

fn to_i32(value: u32, field: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| CheckoutError::Validation(format!("{field} {value} is out of range")))
}

fn to_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or_default()
}

#[derive(Clone)]
pub struct PgInventoryLedger {
    pool: PgPool,
}

impl PgInventoryLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        let specs: serde_json::Value = row.try_get("specs")?;
        let specs: BTreeMap<String, String> =
            serde_json::from_value(specs).map_err(|e| CheckoutError::Storage(e.to_string()))?;

        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            brand: row.try_get("brand")?,
            category: row.try_get("category")?,
            image: row.try_get("image")?,
            specs,
            price: Money::new(row.try_get("price")?),
            stock_quantity: to_u32(row.try_get("stock_quantity")?),
        })
    }
}

#[async_trait]
impl InventoryLedger for PgInventoryLedger {
    async fn product(&self, product_id: ProductId) -> Result<Product> {
        let row = sqlx::query(
            "SELECT id, name, brand, category, image, specs, price, stock_quantity FROM products WHERE id = $1",
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CheckoutError::not_found("Product", product_id))?;

        Self::row_to_product(row)
    }

    async fn availability(&self, product_id: ProductId) -> Result<u32> {
        let stock: Option<i32> =
            sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = $1")
                .bind(product_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        stock
            .map(to_u32)
            .ok_or_else(|| CheckoutError::not_found("Product", product_id))
    }

    async fn reserve(&self, product_id: ProductId, quantity: u32) -> Result<()> {
        let requested = to_i32(quantity, "quantity")?;
        let remaining: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity - $2
            WHERE id = $1 AND stock_quantity >= $2
            RETURNING stock_quantity
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(requested)
        .fetch_optional(&self.pool)
        .await?;

        match remaining {
            Some(remaining) => {
                tracing::debug!(%product_id, quantity, remaining, "stock reserved");
                Ok(())
            }
            None => Err(CheckoutError::InsufficientStock {
                product_id,
                available: self.availability(product_id).await?,
                requested: quantity,
            }),
        }
    }

    async fn release(&self, product_id: ProductId, quantity: u32) -> Result<()> {
        self.restock(product_id, quantity).await.map(|_| ())
    }

    async fn restock(&self, product_id: ProductId, quantity: u32) -> Result<u32> {
        let stock: Option<i32> = sqlx::query_scalar(
            "UPDATE products SET stock_quantity = stock_quantity + $2 WHERE id = $1 RETURNING stock_quantity",
        )
        .bind(product_id.as_uuid())
        .bind(to_i32(quantity, "quantity")?)
        .fetch_optional(&self.pool)
        .await?;

        stock
            .map(to_u32)
            .ok_or_else(|| CheckoutError::not_found("Product", product_id))
    }

    async fn upsert_product(&self, product: Product) -> Result<()> {
        let specs =
            serde_json::to_value(&product.specs).map_err(|e| CheckoutError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO products (id, name, brand, category, image, specs, price, stock_quantity)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                brand = EXCLUDED.brand,
                category = EXCLUDED.category,
                image = EXCLUDED.image,
                specs = EXCLUDED.specs,
                price = EXCLUDED.price,
                stock_quantity = EXCLUDED.stock_quantity
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.brand)
        .bind(&product.category)
        .bind(&product.image)
        .bind(specs)
        .bind(product.price.amount())
        .bind(to_i32(product.stock_quantity, "stock_quantity")?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

const SELECT_CODES: &str = r#"
    SELECT d.code, d.percent, d.max_uses, d.current_uses, d.is_active, d.created_at,
        ARRAY(SELECT o.order_id FROM discount_code_orders o WHERE o.code = d.code) AS linked_orders
    FROM discount_codes d
"#;

#[derive(Clone)]
pub struct PgDiscountRegistry {
    pool: PgPool,
}

impl PgDiscountRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_code(row: PgRow) -> Result<DiscountCode> {
        let code: String = row.try_get("code")?;
        let percent: i32 = row.try_get("percent")?;
        let linked: Vec<Uuid> = row.try_get("linked_orders")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;

        Ok(DiscountCode {
            code: code.trim_end().to_string(),
            percent: u8::try_from(percent).unwrap_or_default(),
            max_uses: to_u32(row.try_get("max_uses")?),
            current_uses: to_u32(row.try_get("current_uses")?),
            is_active: row.try_get("is_active")?,
            linked_orders: linked.into_iter().map(OrderId::from_uuid).collect(),
            created_at,
        })
    }

    /// Works out why `apply` could not take a use of `code`.
    async fn rejection_reason(&self, code: &str) -> Result<DiscountRejection> {
        Ok(match self.get(code).await? {
            None => DiscountRejection::NotFound,
            Some(stored) => stored
                .check_usable()
                .err()
                .unwrap_or(DiscountRejection::UsageLimitReached),
        })
    }
}

#[async_trait]
impl DiscountRegistry for PgDiscountRegistry {
    async fn create(&self, code: DiscountCode) -> Result<DiscountCode> {
        sqlx::query(
            r#"
            INSERT INTO discount_codes (code, percent, max_uses, current_uses, is_active, created_at)
            VALUES ($1, $2, $3, 0, $4, $5)
            "#,
        )
        .bind(&code.code)
        .bind(i32::from(code.percent))
        .bind(to_i32(code.max_uses, "max_uses")?)
        .bind(code.is_active)
        .bind(code.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                DiscountError::AlreadyExists {
                    code: code.code.clone(),
                }
                .into()
            }
            other => CheckoutError::from(other),
        })?;

        Ok(code)
    }

    async fn get(&self, code: &str) -> Result<Option<DiscountCode>> {
        let Ok(code) = normalize_code(code) else {
            return Ok(None);
        };
        let row = sqlx::query(&format!("{SELECT_CODES} WHERE d.code = $1"))
            .bind(&code)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_code).transpose()
    }

    async fn list(&self) -> Result<Vec<DiscountCode>> {
        let rows = sqlx::query(&format!("{SELECT_CODES} ORDER BY d.created_at DESC"))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_code).collect()
    }

    async fn set_active(&self, code: &str, active: bool) -> Result<DiscountCode> {
        let key = normalize_code(code).map_err(|_| CheckoutError::not_found("Discount code", code))?;
        let updated = sqlx::query("UPDATE discount_codes SET is_active = $2 WHERE code = $1")
            .bind(&key)
            .bind(active)
            .execute(&self.pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(CheckoutError::not_found("Discount code", &key));
        }
        self.get(&key)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Discount code", &key))
    }

    async fn delete(&self, code: &str) -> Result<()> {
        let key = normalize_code(code).map_err(|_| CheckoutError::not_found("Discount code", code))?;
        let deleted = sqlx::query("DELETE FROM discount_codes WHERE code = $1 AND current_uses = 0")
            .bind(&key)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 1 {
            return Ok(());
        }

        match self.get(&key).await? {
            None => Err(CheckoutError::not_found("Discount code", &key)),
            Some(stored) => Err(DiscountError::InUse {
                code: stored.code,
                uses: stored.current_uses,
            }
            .into()),
        }
    }

    async fn apply(&self, code: &str, order_id: OrderId) -> Result<()> {
        let key = normalize_code(code).map_err(|_| CheckoutError::InvalidDiscount {
            code: code.to_string(),
            reason: DiscountRejection::NotFound,
        })?;

        let mut tx = self.pool.begin().await?;
        let taken: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE discount_codes
            SET current_uses = current_uses + 1
            WHERE code = $1 AND is_active AND current_uses < max_uses
            RETURNING code
            "#,
        )
        .bind(&key)
        .fetch_optional(&mut *tx)
        .await?;

        if taken.is_none() {
            tx.rollback().await?;
            return Err(CheckoutError::InvalidDiscount {
                reason: self.rejection_reason(&key).await?,
                code: key,
            });
        }

        sqlx::query("INSERT INTO discount_code_orders (code, order_id) VALUES ($1, $2)")
            .bind(&key)
            .bind(order_id.as_uuid())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn release(&self, code: &str, order_id: OrderId) -> Result<()> {
        let Ok(key) = normalize_code(code) else {
            return Ok(());
        };

        let mut tx = self.pool.begin().await?;
        let unlinked = sqlx::query("DELETE FROM discount_code_orders WHERE code = $1 AND order_id = $2")
            .bind(&key)
            .bind(order_id.as_uuid())
            .execute(&mut *tx)
            .await?;
        if unlinked.rows_affected() == 1 {
            sqlx::query(
                "UPDATE discount_codes SET current_uses = current_uses - 1 WHERE code = $1 AND current_uses > 0",
            )
            .bind(&key)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgAddressBook {
    pool: PgPool,
}

impl PgAddressBook {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_address(row: PgRow) -> Result<Address> {
        Ok(Address {
            id: AddressId::from_uuid(row.try_get::<Uuid, _>("id")?),
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            label: row.try_get("label")?,
        })
    }
}

#[async_trait]
impl AddressBook for PgAddressBook {
    async fn register(&self, customer_id: CustomerId, label: String) -> Result<Address> {
        let address = Address {
            id: AddressId::new(),
            customer_id,
            label,
        };
        sqlx::query("INSERT INTO addresses (id, customer_id, label) VALUES ($1, $2, $3)")
            .bind(address.id.as_uuid())
            .bind(customer_id.as_uuid())
            .bind(&address.label)
            .execute(&self.pool)
            .await?;
        Ok(address)
    }

    async fn resolve(&self, customer_id: CustomerId, address_id: AddressId) -> Result<Address> {
        let row = sqlx::query("SELECT id, customer_id, label FROM addresses WHERE id = $1")
            .bind(address_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Address", address_id))?;
        owned_by(Self::row_to_address(row)?, customer_id)
    }

    async fn list(&self, customer_id: CustomerId) -> Result<Vec<Address>> {
        let rows = sqlx::query(
            "SELECT id, customer_id, label FROM addresses WHERE customer_id = $1 ORDER BY label",
        )
        .bind(customer_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_address).collect()
    }
}
