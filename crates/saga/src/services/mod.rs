//! Downstream services used by the order fulfillment saga, with in-memory
//! implementations for tests and local runs.

pub mod inventory;
pub mod payment;
pub mod shipping;

use thiserror::Error;

pub use inventory::{InMemoryInventoryService, InventoryService, Reservation, ReservationLine};
pub use payment::{InMemoryPaymentService, Payment, PaymentService};
pub use shipping::{InMemoryShippingService, Shipment, ShippingService};

/// Errors reported by downstream services.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The service refused the request (insufficient stock, card declined).
    #[error("{0}")]
    Rejected(String),

    /// The service could not be reached.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}
