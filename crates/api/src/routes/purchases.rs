//! Verified purchase check for the review subsystem.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{CustomerId, ProductId};
use domain::OrderId;
use event_store::EventStore;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;
use crate::identity::Identity;

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    pub verified: bool,
    pub order_id: Option<OrderId>,
}

/// GET /purchases/{product_id}: whether the caller has received the product.
#[tracing::instrument(skip(state))]
pub async fn verify<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(product_id): Path<ProductId>,
) -> Result<Json<PurchaseResponse>, ApiError> {
    let customer_id = identity.customer()?;

    state.projection_processor.run_catch_up().await?;
    let order_id = state
        .purchases_view
        .verifying_order(customer_id, product_id)
        .await;

    Ok(Json(PurchaseResponse {
        customer_id,
        product_id,
        verified: order_id.is_some(),
        order_id,
    }))
}
