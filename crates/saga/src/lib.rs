//! Saga orchestration engine.
//!
//! A saga is an ordered sequence of steps triggered by an event. The
//! [`SagaOrchestrator`] runs the applicable steps of a [`StepRegistry`] one
//! after another through the [`StepExecutor`] (timeout and retry policy),
//! persisting each outcome in a [`SagaStore`]. When a step fails, or an
//! operator cancels the saga, the [`CompensationCoordinator`] undoes the
//! executed steps in reverse order.
//!
//! [`order_fulfillment`] wires a sample three-step saga:
//! 1. Reserve inventory
//! 2. Charge payment
//! 3. Confirm the order

pub mod compensation;
pub mod config;
pub mod error;
pub mod executor;
pub mod locks;
pub mod orchestrator;
pub mod order_fulfillment;
pub mod registry;
pub mod result;
pub mod services;
pub mod step;

pub use compensation::{CompensationCoordinator, CompensationReport};
pub use config::{ExecutorConfig, OrchestratorConfig, OverloadPolicy};
pub use error::{Result, SagaError};
pub use executor::StepExecutor;
pub use locks::KeyedLocks;
pub use orchestrator::SagaOrchestrator;
pub use registry::{StepRegistry, StepRegistryBuilder};
pub use result::SagaResult;
pub use saga_store::{
    ExecutedStep, InMemorySagaStore, PostgresSagaStore, SagaId, SagaInstance, SagaQuery,
    SagaStatistics, SagaStatus, SagaStore, StepFailure, StepOutcome, StoreError, TriggeringEvent,
};
pub use services::{
    InMemoryInventoryService, InMemoryPaymentService, InMemoryShippingService, InventoryService,
    PaymentService, ServiceError, ShippingService,
};
pub use step::{FnStep, SagaStep};
