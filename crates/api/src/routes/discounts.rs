//! Discount preview and administration.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::ValidatedDiscount;
use domain::{DiscountCode, Money};
use event_store::EventStore;
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;
use crate::identity::Identity;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub code: String,
    pub subtotal: Money,
}

#[derive(Debug, Deserialize)]
pub struct CreateDiscountRequest {
    pub code: String,
    pub percent: u32,
    pub max_uses: u32,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

/// POST /discounts/validate: prices a subtotal with a code. Consumes nothing.
#[tracing::instrument(skip(state))]
pub async fn validate<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidatedDiscount>, ApiError> {
    let validated = state
        .engine
        .validate_discount(&request.code, request.subtotal)
        .await?;
    Ok(Json(validated))
}

/// POST /admin/discounts
#[tracing::instrument(skip(state))]
pub async fn create<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(request): Json<CreateDiscountRequest>,
) -> Result<(StatusCode, Json<DiscountCode>), ApiError> {
    identity.require_admin()?;
    let code = state
        .engine
        .create_discount(&request.code, request.percent, request.max_uses)
        .await?;
    Ok((StatusCode::CREATED, Json(code)))
}

/// GET /admin/discounts
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<Vec<DiscountCode>>, ApiError> {
    identity.require_admin()?;
    Ok(Json(state.engine.list_discounts().await?))
}

/// GET /admin/discounts/{code}
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(code): Path<String>,
) -> Result<Json<DiscountCode>, ApiError> {
    identity.require_admin()?;
    Ok(Json(state.engine.get_discount(&code).await?))
}

/// PATCH /admin/discounts/{code}: activate or deactivate.
#[tracing::instrument(skip(state))]
pub async fn set_active<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(code): Path<String>,
    Json(request): Json<SetActiveRequest>,
) -> Result<Json<DiscountCode>, ApiError> {
    identity.require_admin()?;
    let code = state
        .engine
        .set_discount_active(&code, request.is_active)
        .await?;
    Ok(Json(code))
}

/// DELETE /admin/discounts/{code}: refused once the code has been used.
#[tracing::instrument(skip(state))]
pub async fn delete<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(code): Path<String>,
) -> Result<StatusCode, ApiError> {
    identity.require_admin()?;
    state.engine.delete_discount(&code).await?;
    Ok(StatusCode::NO_CONTENT)
}
