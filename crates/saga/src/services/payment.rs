//! Payment service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::ServiceError;

/// A captured payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    /// The payment ID assigned by the payment service.
    pub payment_id: String,
    pub amount_cents: u64,
    pub currency: String,
}

/// Payment processing operations, keyed by order ID.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Charges a customer for an order. Charging the same order twice
    /// returns the original payment.
    async fn charge(
        &self,
        order_id: &str,
        customer_id: &str,
        amount_cents: u64,
        currency: &str,
    ) -> Result<Payment, ServiceError>;

    /// Refunds the payment made for an order, if any.
    async fn refund(&self, order_id: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    payments: HashMap<String, Payment>,
    next_id: u32,
    refunds: usize,
    fail_on_charge: bool,
    fail_on_refund: bool,
}

/// In-memory payment service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentService {
    /// Creates a new in-memory payment service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent charge calls fail.
    pub fn set_fail_on_charge(&self, fail: bool) {
        self.write().fail_on_charge = fail;
    }

    /// Makes subsequent refund calls fail.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.write().fail_on_refund = fail;
    }

    /// Returns the number of captured payments.
    pub fn payment_count(&self) -> usize {
        self.read().payments.len()
    }

    /// Returns true if the order has been charged and not refunded.
    pub fn is_charged(&self, order_id: &str) -> bool {
        self.read().payments.contains_key(order_id)
    }

    /// Returns how many payments have been refunded.
    pub fn refund_count(&self) -> usize {
        self.read().refunds
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryPaymentState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryPaymentState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn charge(
        &self,
        order_id: &str,
        _customer_id: &str,
        amount_cents: u64,
        currency: &str,
    ) -> Result<Payment, ServiceError> {
        let mut state = self.write();

        if state.fail_on_charge {
            return Err(ServiceError::Rejected("Payment declined".to_string()));
        }

        if let Some(payment) = state.payments.get(order_id) {
            return Ok(payment.clone());
        }

        state.next_id += 1;
        let payment = Payment {
            payment_id: format!("PAY-{:04}", state.next_id),
            amount_cents,
            currency: currency.to_string(),
        };
        state
            .payments
            .insert(order_id.to_string(), payment.clone());

        Ok(payment)
    }

    async fn refund(&self, order_id: &str) -> Result<(), ServiceError> {
        let mut state = self.write();

        if state.fail_on_refund {
            return Err(ServiceError::Unavailable(
                "payment gateway unreachable".to_string(),
            ));
        }

        if state.payments.remove(order_id).is_some() {
            state.refunds += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_charge_and_refund() {
        let service = InMemoryPaymentService::new();

        let payment = service
            .charge("order-42", "customer-7", 4_999, "EUR")
            .await
            .unwrap();
        assert_eq!(payment.payment_id, "PAY-0001");
        assert_eq!(payment.amount_cents, 4_999);
        assert!(service.is_charged("order-42"));

        service.refund("order-42").await.unwrap();
        assert!(!service.is_charged("order-42"));
        assert_eq!(service.refund_count(), 1);
    }

    #[tokio::test]
    async fn test_charge_is_idempotent() {
        let service = InMemoryPaymentService::new();

        let first = service.charge("order-42", "c", 100, "EUR").await.unwrap();
        let second = service.charge("order-42", "c", 100, "EUR").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(service.payment_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_on_charge() {
        let service = InMemoryPaymentService::new();
        service.set_fail_on_charge(true);

        let result = service.charge("order-42", "c", 100, "EUR").await;

        assert!(matches!(result, Err(ServiceError::Rejected(_))));
        assert_eq!(service.payment_count(), 0);
    }

    #[tokio::test]
    async fn test_fail_on_refund_keeps_payment() {
        let service = InMemoryPaymentService::new();
        service.charge("order-42", "c", 100, "EUR").await.unwrap();
        service.set_fail_on_refund(true);

        assert!(service.refund("order-42").await.is_err());
        assert!(service.is_charged("order-42"));
    }
}
