//! Loyalty balance endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::CustomerId;
use domain::POINT_VALUE;
use event_store::EventStore;
use projections::Reconciliation;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;
use crate::identity::Identity;

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub customer_id: CustomerId,
    pub available: i64,
    pub earned: i64,
    pub used: i64,
    pub delivered_orders: u32,
    pub point_value: i64,
}

#[derive(Debug, Serialize)]
pub struct ReconciliationResponse {
    #[serde(flatten)]
    pub reconciliation: Reconciliation,
    pub consistent: bool,
    pub drift: i64,
}

/// GET /loyalty: the caller's balance, recomputed from delivered orders.
#[tracing::instrument(skip(state))]
pub async fn balance<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<BalanceResponse>, ApiError> {
    let customer_id = identity.customer()?;
    let balance = state.engine.loyalty_balance(customer_id).await?;

    Ok(Json(BalanceResponse {
        customer_id,
        available: balance.available(),
        earned: balance.earned,
        used: balance.used,
        delivered_orders: balance.delivered_orders,
        point_value: POINT_VALUE,
    }))
}

/// GET /admin/loyalty/{customer_id}/reconcile: compares the running balance
/// with a full recomputation.
#[tracing::instrument(skip(state))]
pub async fn reconcile<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(customer_id): Path<CustomerId>,
) -> Result<Json<ReconciliationResponse>, ApiError> {
    identity.require_admin()?;

    state.projection_processor.run_catch_up().await?;
    let recomputed = state.engine.loyalty_balance(customer_id).await?;
    let reconciliation = state.loyalty_view.reconcile(customer_id, recomputed).await;

    Ok(Json(ReconciliationResponse {
        consistent: reconciliation.is_consistent(),
        drift: reconciliation.drift(),
        reconciliation,
    }))
}
