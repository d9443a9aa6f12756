//! Order placement, reads and status administration.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use checkout::{PlacementRequest, Transitions};
use common::{AddressId, CustomerId};
use domain::{
    Aggregate, LineItem, Money, Order, OrderId, OrderStatus, PaymentMethod, StatusEntry,
};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::identity::Identity;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub note: Option<String>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Option<OrderId>,
    pub customer_id: Option<CustomerId>,
    pub status: OrderStatus,
    pub line_items: Vec<LineItem>,
    pub shipping_address_id: Option<AddressId>,
    pub payment_method: Option<PaymentMethod>,
    pub subtotal: Money,
    pub discount_code: Option<String>,
    pub discount_amount: Money,
    pub loyalty_points_used: u32,
    pub loyalty_points_earned: u32,
    pub total_amount: Money,
    pub status_history: Vec<StatusEntry>,
    pub placed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id(),
            customer_id: order.customer_id(),
            status: order.status(),
            line_items: order.line_items().to_vec(),
            shipping_address_id: order.shipping_address_id(),
            payment_method: order.payment_method(),
            subtotal: order.subtotal(),
            discount_code: order.discount_code().map(str::to_string),
            discount_amount: order.discount_amount(),
            loyalty_points_used: order.loyalty_points_used(),
            loyalty_points_earned: order.loyalty_points_earned(),
            total_amount: order.total_amount(),
            status_history: order.status_history().to_vec(),
            placed_at: order.placed_at(),
            version: order.version().as_i64(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusUpdateResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub entry: Option<StatusEntry>,
    pub allowed_next: Vec<OrderStatus>,
}

// -- Handlers --

/// POST /orders: place an order for the calling customer.
#[tracing::instrument(skip(state, request), fields(customer_id = tracing::field::Empty))]
pub async fn place<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(request): Json<PlacementRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let customer_id = identity.customer()?;
    tracing::Span::current().record("customer_id", tracing::field::display(customer_id));

    let order = state.engine.place_order(customer_id, request).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /orders: the caller's orders, most recent first.
#[tracing::instrument(skip(state))]
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let customer_id = identity.customer()?;
    let orders = state.engine.orders_for_customer(customer_id).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/{id}: readable by its owner or an admin.
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(order_id): Path<OrderId>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = if identity.is_admin() {
        state.engine.get_order(order_id).await?
    } else {
        let customer_id = identity.customer()?;
        state.engine.get_customer_order(customer_id, order_id).await?
    };
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /orders/{id}/transitions: current status and legal next statuses.
#[tracing::instrument(skip(state))]
pub async fn transitions<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Transitions>, ApiError> {
    identity.require_admin()?;
    Ok(Json(state.engine.legal_transitions(order_id).await?))
}

/// PATCH /orders/{id}/status: move an order along the status graph.
#[tracing::instrument(skip(state, request), fields(to = %request.status))]
pub async fn update_status<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(order_id): Path<OrderId>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<StatusUpdateResponse>, ApiError> {
    identity.require_admin()?;

    let order = state
        .engine
        .update_status(order_id, request.status, request.note)
        .await?;

    Ok(Json(StatusUpdateResponse {
        order_id,
        status: order.status(),
        entry: order.status_history().last().cloned(),
        allowed_next: order.legal_next_statuses().to_vec(),
    }))
}
