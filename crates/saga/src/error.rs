//! Saga error types.

use common::SagaId;
use saga_store::{SagaStatus, StoreError, TransitionError};
use thiserror::Error;

/// Errors surfaced to callers of the orchestrator.
///
/// Step failures never appear here: they are reported through
/// [`StepOutcome`](saga_store::StepOutcome) and drive compensation instead.
#[derive(Debug, Error)]
pub enum SagaError {
    /// No saga instance exists with the given ID.
    #[error("Saga not found: {0}")]
    NotFound(SagaId),

    /// A saga with this ID has already been started.
    #[error("Saga has already been started: {0}")]
    AlreadyStarted(SagaId),

    /// The saga completed; it can no longer be cancelled.
    #[error("Saga {0} is already completed")]
    AlreadyCompleted(SagaId),

    /// The saga is in a status that does not allow the requested operation.
    #[error("Cannot {operation} saga {id} in status {status}")]
    InvalidState {
        id: SagaId,
        status: SagaStatus,
        operation: &'static str,
    },

    /// The status change is not allowed by the saga state machine.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// Two steps were registered under the same name.
    #[error("Duplicate step name in registry: {0}")]
    DuplicateStep(String),

    /// The saga store failed; the instance keeps its last persisted state.
    #[error("Saga store error: {0}")]
    Store(#[source] StoreError),

    /// Every worker is busy and the overload policy rejects new work.
    #[error("Saga worker pool is saturated")]
    Overloaded,

    /// The orchestrator has been shut down.
    #[error("Saga orchestrator is shutting down")]
    ShuttingDown,

    /// A worker task panicked or was aborted.
    #[error("Saga worker failed: {0}")]
    Worker(String),

    /// A triggering event payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for SagaError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => SagaError::NotFound(id),
            other => SagaError::Store(other),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
