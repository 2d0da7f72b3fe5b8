//! Durable state storage for saga instances.
//!
//! A saga instance records the triggering event, the lifecycle status and
//! the append-only log of executed forward steps and compensation attempts.
//! The [`SagaStore`] trait is the narrow contract the orchestrator needs;
//! [`InMemorySagaStore`] and [`PostgresSagaStore`] implement it.

pub mod error;
pub mod event;
pub mod instance;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod status;
pub mod store;

pub use common::SagaId;
pub use error::{Result, StoreError};
pub use event::{EventId, TriggeringEvent};
pub use instance::{DEFAULT_SAGA_TYPE, ExecutedStep, SagaInstance, StepFailure, StepOutcome};
pub use memory::InMemorySagaStore;
pub use postgres::PostgresSagaStore;
pub use query::{SagaQuery, SagaStatistics};
pub use status::{SagaStatus, TransitionError};
pub use store::{SagaStore, SagaStoreExt};
