//! The caller's shipping address book.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use checkout::Address;
use event_store::EventStore;
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;
use crate::identity::Identity;

#[derive(Debug, Deserialize)]
pub struct RegisterAddressRequest {
    pub label: String,
}

/// POST /addresses
#[tracing::instrument(skip(state, request))]
pub async fn register<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(request): Json<RegisterAddressRequest>,
) -> Result<(StatusCode, Json<Address>), ApiError> {
    let customer_id = identity.customer()?;
    let label = request.label.trim();
    if label.is_empty() {
        return Err(ApiError::BadRequest("address label must not be empty".to_string()));
    }
    let address = state
        .engine
        .register_address(customer_id, label.to_string())
        .await?;
    Ok((StatusCode::CREATED, Json(address)))
}

/// GET /addresses
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<Vec<Address>>, ApiError> {
    let customer_id = identity.customer()?;
    Ok(Json(state.engine.addresses_for(customer_id).await?))
}
