//! Inventory service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::ServiceError;

/// A stock reservation held for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// The reservation ID assigned by the inventory service.
    pub reservation_id: String,
}

/// A product quantity to reserve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationLine {
    pub product_id: String,
    pub quantity: u32,
}

/// Inventory management operations, keyed by order ID.
///
/// Both operations are idempotent: reserving an already reserved order
/// returns the existing reservation, releasing an unknown order succeeds.
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Reserves stock for an order.
    async fn reserve(
        &self,
        order_id: &str,
        lines: &[ReservationLine],
    ) -> Result<Reservation, ServiceError>;

    /// Releases the reservation held for an order.
    async fn release(&self, order_id: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    reservations: HashMap<String, (Reservation, Vec<ReservationLine>)>,
    next_id: u32,
    releases: usize,
    fail_on_reserve: bool,
    fail_on_release: bool,
}

/// In-memory inventory service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryService {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventoryService {
    /// Creates a new in-memory inventory service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent reserve calls fail.
    pub fn set_fail_on_reserve(&self, fail: bool) {
        self.write().fail_on_reserve = fail;
    }

    /// Makes subsequent release calls fail.
    pub fn set_fail_on_release(&self, fail: bool) {
        self.write().fail_on_release = fail;
    }

    /// Returns the number of active reservations.
    pub fn reservation_count(&self) -> usize {
        self.read().reservations.len()
    }

    /// Returns true if stock is reserved for the order.
    pub fn is_reserved(&self, order_id: &str) -> bool {
        self.read().reservations.contains_key(order_id)
    }

    /// Returns how many reservations have been released.
    pub fn release_count(&self) -> usize {
        self.read().releases
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryInventoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryInventoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl InventoryService for InMemoryInventoryService {
    async fn reserve(
        &self,
        order_id: &str,
        lines: &[ReservationLine],
    ) -> Result<Reservation, ServiceError> {
        let mut state = self.write();

        if state.fail_on_reserve {
            return Err(ServiceError::Rejected("Insufficient stock".to_string()));
        }

        if let Some((reservation, _)) = state.reservations.get(order_id) {
            return Ok(reservation.clone());
        }

        state.next_id += 1;
        let reservation = Reservation {
            reservation_id: format!("RES-{:04}", state.next_id),
        };
        state
            .reservations
            .insert(order_id.to_string(), (reservation.clone(), lines.to_vec()));

        Ok(reservation)
    }

    async fn release(&self, order_id: &str) -> Result<(), ServiceError> {
        let mut state = self.write();

        if state.fail_on_release {
            return Err(ServiceError::Unavailable(
                "inventory release timed out".to_string(),
            ));
        }

        if state.reservations.remove(order_id).is_some() {
            state.releases += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines() -> Vec<ReservationLine> {
        vec![ReservationLine {
            product_id: "SKU-001".to_string(),
            quantity: 2,
        }]
    }

    #[tokio::test]
    async fn test_reserve_and_release() {
        let service = InMemoryInventoryService::new();

        let reservation = service.reserve("order-42", &lines()).await.unwrap();
        assert_eq!(reservation.reservation_id, "RES-0001");
        assert!(service.is_reserved("order-42"));

        service.release("order-42").await.unwrap();
        assert_eq!(service.reservation_count(), 0);
        assert_eq!(service.release_count(), 1);
    }

    #[tokio::test]
    async fn test_reserve_is_idempotent() {
        let service = InMemoryInventoryService::new();

        let first = service.reserve("order-42", &lines()).await.unwrap();
        let second = service.reserve("order-42", &lines()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(service.reservation_count(), 1);
    }

    #[tokio::test]
    async fn test_release_unknown_order_is_noop() {
        let service = InMemoryInventoryService::new();

        service.release("order-404").await.unwrap();
        assert_eq!(service.release_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_toggles() {
        let service = InMemoryInventoryService::new();
        service.set_fail_on_reserve(true);

        let result = service.reserve("order-42", &lines()).await;
        assert_eq!(
            result,
            Err(ServiceError::Rejected("Insufficient stock".to_string()))
        );
        assert_eq!(service.reservation_count(), 0);

        service.set_fail_on_reserve(false);
        service.reserve("order-42", &lines()).await.unwrap();
        service.set_fail_on_release(true);
        assert!(service.release("order-42").await.is_err());
        assert!(service.is_reserved("order-42"));
    }
}
