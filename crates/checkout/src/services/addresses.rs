//! Customer address book.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{AddressId, CustomerId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{CheckoutError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub customer_id: CustomerId,
    pub label: String,
}

/// Resolves shipping addresses for the customer placing an order.
#[async_trait]
pub trait AddressBook: Send + Sync {
    async fn register(&self, customer_id: CustomerId, label: String) -> Result<Address>;

    /// Fails with `NotFound` for an unknown id and `Forbidden` when the
    /// address belongs to someone else.
    async fn resolve(&self, customer_id: CustomerId, address_id: AddressId) -> Result<Address>;

    async fn list(&self, customer_id: CustomerId) -> Result<Vec<Address>>;
}

/// Checks that `address` belongs to `customer_id`.
pub(crate) fn owned_by(address: Address, customer_id: CustomerId) -> Result<Address> {
    if address.customer_id != customer_id {
        return Err(CheckoutError::Forbidden(format!(
            "address {} does not belong to customer {customer_id}",
            address.id
        )));
    }
    Ok(address)
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryAddressBook {
    addresses: Arc<RwLock<HashMap<AddressId, Address>>>,
}

impl InMemoryAddressBook {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AddressBook for InMemoryAddressBook {
    async fn register(&self, customer_id: CustomerId, label: String) -> Result<Address> {
        let address = Address {
            id: AddressId::new(),
            customer_id,
            label,
        };
        self.addresses
            .write()
            .await
            .insert(address.id, address.clone());
        Ok(address)
    }

    async fn resolve(&self, customer_id: CustomerId, address_id: AddressId) -> Result<Address> {
        let address = self
            .addresses
            .read()
            .await
            .get(&address_id)
            .cloned()
            .ok_or_else(|| CheckoutError::not_found("Address", address_id))?;
        owned_by(address, customer_id)
    }

    async fn list(&self, customer_id: CustomerId) -> Result<Vec<Address>> {
        let mut addresses: Vec<_> = self
            .addresses
            .read()
            .await
            .values()
            .filter(|a| a.customer_id == customer_id)
            .cloned()
            .collect();
        addresses.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(addresses)
    }
}
