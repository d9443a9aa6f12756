//! Caller identity supplied by the upstream gateway.
//!
//! The gateway authenticates the caller and forwards `x-customer-id` (a UUID)
//! and `x-role` (`customer` by default, or `admin`).

use std::str::FromStr;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::CustomerId;

use crate::error::ApiError;

pub const CUSTOMER_HEADER: &str = "x-customer-id";
pub const ROLE_HEADER: &str = "x-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub customer_id: Option<CustomerId>,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// The calling customer. Routes acting on the caller's own data need one.
    pub fn customer(&self) -> Result<CustomerId, ApiError> {
        self.customer_id.ok_or_else(|| {
            ApiError::Unauthorized(format!("missing {CUSTOMER_HEADER} header"))
        })
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if !self.is_admin() {
            return Err(ApiError::Forbidden("admin role required".to_string()));
        }
        Ok(())
    }

    fn from_parts(parts: &Parts) -> Result<Self, ApiError> {
        let customer_id = header(parts, CUSTOMER_HEADER)?
            .map(|raw| {
                CustomerId::from_str(raw)
                    .map_err(|e| ApiError::Unauthorized(format!("invalid {CUSTOMER_HEADER}: {e}")))
            })
            .transpose()?;

        let role = match header(parts, ROLE_HEADER)? {
            None => Role::Customer,
            Some(raw) if raw.eq_ignore_ascii_case("customer") => Role::Customer,
            Some(raw) if raw.eq_ignore_ascii_case("admin") => Role::Admin,
            Some(raw) => {
                return Err(ApiError::Unauthorized(format!("unknown role {raw:?}")));
            }
        };

        Ok(Self { customer_id, role })
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    parts
        .headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map(str::trim)
                .map_err(|_| ApiError::Unauthorized(format!("invalid {name} header")))
        })
        .transpose()
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_parts(parts)
    }
}
