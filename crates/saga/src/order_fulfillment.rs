//! The order fulfillment saga: reserve stock, take payment, ship.
//!
//! Triggered by an `OrderCreated` event. If any step fails, the steps that
//! already ran are compensated in reverse order.

use async_trait::async_trait;
use saga_store::{StepOutcome, TriggeringEvent};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::registry::StepRegistry;
use crate::services::{InventoryService, PaymentService, ReservationLine, ShippingService};
use crate::step::SagaStep;

/// The saga type identifier for order fulfillment.
pub const SAGA_TYPE: &str = "OrderFulfillment";

/// Event type that triggers the saga.
pub const ORDER_CREATED: &str = "OrderCreated";

/// Step name: Reserve inventory for the order.
pub const STEP_RESERVE_INVENTORY: &str = "reserve_inventory";

/// Step name: Charge the customer.
pub const STEP_CHARGE_PAYMENT: &str = "charge_payment";

/// Step name: Confirm the order by creating its shipment.
pub const STEP_CONFIRM_ORDER: &str = "confirm_order";

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: u64,
}

/// Payload of an `OrderCreated` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: String,
    pub customer_id: String,
    pub lines: Vec<OrderLine>,
    pub total_cents: u64,
    pub currency: String,
    pub shipping_address: String,
    pub payment_method: String,
}

impl OrderCreated {
    /// Wraps the order in a triggering event tagged with the order ID.
    pub fn into_event(self) -> Result<TriggeringEvent> {
        let order_id = self.order_id.clone();
        Ok(TriggeringEvent::from_data(ORDER_CREATED, &self)?.with_aggregate_id(order_id))
    }

    fn from_event(event: &TriggeringEvent) -> std::result::Result<Self, StepOutcome> {
        event
            .data()
            .map_err(|e| StepOutcome::failure(format!("invalid {ORDER_CREATED} payload: {e}")))
    }
}

/// Builds the order fulfillment registry:
/// `reserve_inventory`, `charge_payment`, `confirm_order`.
pub fn registry<I, P, Sh>(inventory: I, payment: P, shipping: Sh) -> Result<StepRegistry>
where
    I: InventoryService + 'static,
    P: PaymentService + 'static,
    Sh: ShippingService + 'static,
{
    StepRegistry::builder()
        .step(ReserveInventory { inventory })
        .step(ChargePayment { payment })
        .step(ConfirmOrder { shipping })
        .build()
}

/// Reserves stock for every order line; compensated by releasing it.
pub struct ReserveInventory<I> {
    inventory: I,
}

#[async_trait]
impl<I: InventoryService> SagaStep for ReserveInventory<I> {
    fn name(&self) -> &str {
        STEP_RESERVE_INVENTORY
    }

    fn is_applicable(&self, event: &TriggeringEvent) -> bool {
        event.is_type(ORDER_CREATED)
    }

    async fn execute(&self, event: &TriggeringEvent) -> StepOutcome {
        let order = match OrderCreated::from_event(event) {
            Ok(order) => order,
            Err(outcome) => return outcome,
        };
        let lines: Vec<ReservationLine> = order
            .lines
            .iter()
            .map(|line| ReservationLine {
                product_id: line.product_id.clone(),
                quantity: line.quantity,
            })
            .collect();

        match self.inventory.reserve(&order.order_id, &lines).await {
            Ok(reservation) => {
                tracing::debug!(order_id = %order.order_id, reservation_id = %reservation.reservation_id, "inventory reserved");
                StepOutcome::success()
            }
            Err(e) => StepOutcome::failure(e.to_string()),
        }
    }

    fn has_compensation(&self) -> bool {
        true
    }

    async fn compensate(&self, event: &TriggeringEvent) -> StepOutcome {
        let order = match OrderCreated::from_event(event) {
            Ok(order) => order,
            Err(outcome) => return outcome,
        };
        match self.inventory.release(&order.order_id).await {
            Ok(()) => StepOutcome::success(),
            Err(e) => StepOutcome::failure(e.to_string()),
        }
    }
}

/// Charges the order total; compensated by a refund. Skipped for free
/// orders.
pub struct ChargePayment<P> {
    payment: P,
}

#[async_trait]
impl<P: PaymentService> SagaStep for ChargePayment<P> {
    fn name(&self) -> &str {
        STEP_CHARGE_PAYMENT
    }

    fn is_applicable(&self, event: &TriggeringEvent) -> bool {
        event.is_type(ORDER_CREATED)
            && event
                .payload
                .get("total_cents")
                .and_then(serde_json::Value::as_u64)
                .is_some_and(|total| total > 0)
    }

    async fn execute(&self, event: &TriggeringEvent) -> StepOutcome {
        let order = match OrderCreated::from_event(event) {
            Ok(order) => order,
            Err(outcome) => return outcome,
        };

        match self
            .payment
            .charge(
                &order.order_id,
                &order.customer_id,
                order.total_cents,
                &order.currency,
            )
            .await
        {
            Ok(payment) => {
                tracing::debug!(order_id = %order.order_id, payment_id = %payment.payment_id, "payment captured");
                StepOutcome::success()
            }
            Err(e) => StepOutcome::failure(e.to_string()),
        }
    }

    fn has_compensation(&self) -> bool {
        true
    }

    async fn compensate(&self, event: &TriggeringEvent) -> StepOutcome {
        let order = match OrderCreated::from_event(event) {
            Ok(order) => order,
            Err(outcome) => return outcome,
        };
        match self.payment.refund(&order.order_id).await {
            Ok(()) => StepOutcome::success(),
            Err(e) => StepOutcome::failure(e.to_string()),
        }
    }
}

/// Confirms the order by creating its shipment. Last step, so it is never
/// compensated.
pub struct ConfirmOrder<Sh> {
    shipping: Sh,
}

#[async_trait]
impl<Sh: ShippingService> SagaStep for ConfirmOrder<Sh> {
    fn name(&self) -> &str {
        STEP_CONFIRM_ORDER
    }

    fn is_applicable(&self, event: &TriggeringEvent) -> bool {
        event.is_type(ORDER_CREATED)
    }

    async fn execute(&self, event: &TriggeringEvent) -> StepOutcome {
        let order = match OrderCreated::from_event(event) {
            Ok(order) => order,
            Err(outcome) => return outcome,
        };

        match self
            .shipping
            .create_shipment(&order.order_id, &order.shipping_address)
            .await
        {
            Ok(shipment) => {
                tracing::debug!(order_id = %order.order_id, tracking_number = %shipment.tracking_number, "order confirmed");
                StepOutcome::success()
            }
            Err(e) => StepOutcome::failure(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{InMemoryInventoryService, InMemoryPaymentService, InMemoryShippingService};

    fn order(total_cents: u64) -> OrderCreated {
        OrderCreated {
            order_id: "order-42".to_string(),
            customer_id: "customer-7".to_string(),
            lines: vec![OrderLine {
                product_id: "SKU-001".to_string(),
                product_name: "Widget".to_string(),
                quantity: 2,
                unit_price_cents: total_cents / 2,
            }],
            total_cents,
            currency: "EUR".to_string(),
            shipping_address: "1 Main St".to_string(),
            payment_method: "card".to_string(),
        }
    }

    fn registry_with_services() -> (
        StepRegistry,
        InMemoryInventoryService,
        InMemoryPaymentService,
        InMemoryShippingService,
    ) {
        let inventory = InMemoryInventoryService::new();
        let payment = InMemoryPaymentService::new();
        let shipping = InMemoryShippingService::new();
        let registry = registry(inventory.clone(), payment.clone(), shipping.clone()).unwrap();
        (registry, inventory, payment, shipping)
    }

    #[test]
    fn test_registry_order() {
        let (registry, ..) = registry_with_services();
        assert_eq!(
            registry.names(),
            vec![STEP_RESERVE_INVENTORY, STEP_CHARGE_PAYMENT, STEP_CONFIRM_ORDER]
        );
    }

    #[test]
    fn test_event_carries_order_id() {
        let event = order(1_000).into_event().unwrap();

        assert!(event.is_type(ORDER_CREATED));
        assert_eq!(event.aggregate_id.as_deref(), Some("order-42"));
        assert_eq!(event.data::<OrderCreated>().unwrap(), order(1_000));
    }

    #[test]
    fn test_free_orders_skip_payment() {
        let (registry, ..) = registry_with_services();
        let event = order(0).into_event().unwrap();

        let names: Vec<_> = registry
            .for_each_applicable(&event)
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec![STEP_RESERVE_INVENTORY, STEP_CONFIRM_ORDER]);
    }

    #[test]
    fn test_other_events_are_not_applicable() {
        let (registry, ..) = registry_with_services();
        let event = TriggeringEvent::new("OrderShipped", serde_json::json!({}));

        assert_eq!(registry.for_each_applicable(&event).count(), 0);
    }

    #[tokio::test]
    async fn test_steps_call_services() {
        let (registry, inventory, payment, shipping) = registry_with_services();
        let event = order(1_000).into_event().unwrap();

        for step in registry.for_each_applicable(&event) {
            assert!(step.execute(&event).await.success);
        }
        assert!(inventory.is_reserved("order-42"));
        assert!(payment.is_charged("order-42"));
        assert!(shipping.has_shipment("order-42"));

        let charge = registry.get(STEP_CHARGE_PAYMENT).unwrap();
        assert!(charge.compensate(&event).await.success);
        assert!(!payment.is_charged("order-42"));
    }

    #[tokio::test]
    async fn test_service_error_becomes_failed_outcome() {
        let (registry, inventory, ..) = registry_with_services();
        inventory.set_fail_on_reserve(true);
        let event = order(1_000).into_event().unwrap();

        let outcome = registry
            .get(STEP_RESERVE_INVENTORY)
            .unwrap()
            .execute(&event)
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.message(), "Insufficient stock");
    }

    #[tokio::test]
    async fn test_malformed_payload_fails_step() {
        let (registry, ..) = registry_with_services();
        let event = TriggeringEvent::new(ORDER_CREATED, serde_json::json!({"order_id": 1}));

        let outcome = registry
            .get(STEP_RESERVE_INVENTORY)
            .unwrap()
            .execute(&event)
            .await;

        assert!(!outcome.success);
        assert!(outcome.message().starts_with("invalid OrderCreated payload"));
    }
}
