//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use projections::ProjectionError;
use serde_json::{Value, json};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed identity headers.
    Unauthorized(String),
    /// Authenticated, but not allowed to call this route.
    Forbidden(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Rejection from the order engine.
    Checkout(CheckoutError),
    /// Read model failure.
    Projection(ProjectionError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Checkout(err) => checkout_status(err),
            ApiError::Projection(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Checkout(err) => err.kind(),
            ApiError::Projection(_) => "projection",
        }
    }
}

fn checkout_status(err: &CheckoutError) -> StatusCode {
    match err {
        CheckoutError::Validation(_) => StatusCode::BAD_REQUEST,
        CheckoutError::InsufficientStock { .. }
        | CheckoutError::InvalidDiscount { .. }
        | CheckoutError::InsufficientLoyaltyPoints { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CheckoutError::InvalidTransition { .. } | CheckoutError::Conflict(_) => {
            StatusCode::CONFLICT
        }
        CheckoutError::NotFound { .. } => StatusCode::NOT_FOUND,
        CheckoutError::Forbidden(_) => StatusCode::FORBIDDEN,
        CheckoutError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        CheckoutError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Structured detail for the errors that carry more than a message.
fn checkout_details(err: &CheckoutError) -> Value {
    match err {
        CheckoutError::InsufficientStock {
            product_id,
            available,
            requested,
        } => json!({
            "product_id": product_id,
            "available": available,
            "requested": requested,
        }),
        CheckoutError::InvalidDiscount { code, reason } => json!({
            "code": code,
            "reason": reason,
        }),
        CheckoutError::InsufficientLoyaltyPoints {
            current,
            requested,
            point_value,
        } => json!({
            "current": current,
            "requested": requested,
            "point_value": point_value,
        }),
        CheckoutError::InvalidTransition { from, to, allowed } => json!({
            "from": from,
            "to": to,
            "allowed": allowed,
        }),
        CheckoutError::NotFound { entity, id } => json!({
            "entity": entity,
            "id": id,
        }),
        CheckoutError::Timeout { operation, after } => json!({
            "operation": operation,
            "after_ms": after.as_millis(),
        }),
        _ => Value::Null,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();

        let (message, details) = match &self {
            ApiError::Checkout(err) => (err.to_string(), checkout_details(err)),
            ApiError::Projection(err) => (err.to_string(), Value::Null),
            ApiError::Unauthorized(msg) | ApiError::Forbidden(msg) | ApiError::BadRequest(msg) => {
                (msg.clone(), Value::Null)
            }
        };

        if status.is_server_error() {
            tracing::error!(kind, error = %message, "request failed");
        } else {
            tracing::debug!(kind, error = %message, "request rejected");
        }

        let body = json!({ "error": message, "kind": kind, "details": details });
        (status, axum::Json(body)).into_response()
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        ApiError::Projection(err)
    }
}
