//! Catalog reads and inventory administration.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::Product;
use common::ProductId;
use domain::Money;
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::identity::Identity;

/// Registers a new product, or replaces one when `id` is given.
#[derive(Debug, Deserialize)]
pub struct UpsertProductRequest {
    #[serde(default)]
    pub id: Option<ProductId>,
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub specs: BTreeMap<String, String>,
    pub price: Money,
    pub stock_quantity: u32,
}

impl From<UpsertProductRequest> for Product {
    fn from(request: UpsertProductRequest) -> Self {
        let mut product = Product::new(request.name, request.price, request.stock_quantity)
            .with_brand(request.brand)
            .with_category(request.category);
        if let Some(id) = request.id {
            product.id = id;
        }
        product.image = request.image;
        product.specs = request.specs;
        product
    }
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct StockResponse {
    pub product_id: ProductId,
    pub stock_quantity: u32,
}

/// GET /products/{id}
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<ProductId>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.engine.product(product_id).await?))
}

/// POST /admin/products
#[tracing::instrument(skip(state, request))]
pub async fn upsert<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(request): Json<UpsertProductRequest>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    identity.require_admin()?;
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("product name must not be empty".to_string()));
    }
    let product = state.engine.upsert_product(request.into()).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// POST /admin/products/{id}/restock
#[tracing::instrument(skip(state))]
pub async fn restock<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(product_id): Path<ProductId>,
    Json(request): Json<RestockRequest>,
) -> Result<Json<StockResponse>, ApiError> {
    identity.require_admin()?;
    let stock_quantity = state.engine.restock(product_id, request.quantity).await?;
    Ok(Json(StockResponse {
        product_id,
        stock_quantity,
    }))
}
