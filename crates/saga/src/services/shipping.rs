//! Shipping service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::ServiceError;

/// A shipment created for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shipment {
    /// The tracking number assigned by the shipping service.
    pub tracking_number: String,
}

/// Shipping operations, keyed by order ID.
#[async_trait]
pub trait ShippingService: Send + Sync {
    /// Creates a shipment for an order. Repeated calls for the same order
    /// return the existing shipment.
    async fn create_shipment(
        &self,
        order_id: &str,
        address: &str,
    ) -> Result<Shipment, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryShippingState {
    shipments: HashMap<String, Shipment>,
    next_id: u32,
    fail_on_create: bool,
}

/// In-memory shipping service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryShippingService {
    state: Arc<RwLock<InMemoryShippingState>>,
}

impl InMemoryShippingService {
    /// Creates a new in-memory shipping service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent create_shipment calls fail.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.write().fail_on_create = fail;
    }

    /// Returns the number of shipments.
    pub fn shipment_count(&self) -> usize {
        self.read().shipments.len()
    }

    /// Returns true if a shipment exists for the order.
    pub fn has_shipment(&self, order_id: &str) -> bool {
        self.read().shipments.contains_key(order_id)
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryShippingState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryShippingState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ShippingService for InMemoryShippingService {
    async fn create_shipment(
        &self,
        order_id: &str,
        _address: &str,
    ) -> Result<Shipment, ServiceError> {
        let mut state = self.write();

        if state.fail_on_create {
            return Err(ServiceError::Unavailable(
                "Shipping carrier unavailable".to_string(),
            ));
        }

        if let Some(shipment) = state.shipments.get(order_id) {
            return Ok(shipment.clone());
        }

        state.next_id += 1;
        let shipment = Shipment {
            tracking_number: format!("TRACK-{:06}", state.next_id),
        };
        state
            .shipments
            .insert(order_id.to_string(), shipment.clone());

        Ok(shipment)
    }
}
