//! Saga instance record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{SagaId, SagaStatus, TransitionError, TriggeringEvent};

/// Saga type label used when the caller does not provide one.
pub const DEFAULT_SAGA_TYPE: &str = "saga";

/// Result of executing or compensating a step.
///
/// There is no partial success: a step either fully succeeded or failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub success: bool,
    pub error_message: Option<String>,
}

impl StepOutcome {
    /// A successful outcome.
    pub fn success() -> Self {
        Self {
            success: true,
            error_message: None,
        }
    }

    /// A failed outcome carrying an error message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
        }
    }

    /// Returns the error message, or an empty string for a success.
    pub fn message(&self) -> &str {
        self.error_message.as_deref().unwrap_or_default()
    }
}

/// One entry of a saga's step history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedStep {
    pub step_name: String,
    pub outcome: StepOutcome,
    pub recorded_at: DateTime<Utc>,
}

impl ExecutedStep {
    fn now(step_name: impl Into<String>, outcome: StepOutcome) -> Self {
        Self {
            step_name: step_name.into(),
            outcome,
            recorded_at: Utc::now(),
        }
    }
}

/// The forward step whose failure caused the saga to unwind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step_name: String,
    pub error_message: String,
}

/// One in-flight or finished distributed transaction.
///
/// `executed_steps` is the append-only log of forward steps that succeeded,
/// in execution order; compensation reads it in reverse. Compensation
/// attempts are logged separately in `compensations`, in the order they ran.
/// Neither log shrinks except through [`SagaInstance::reset_for_retry`],
/// which starts a new attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaInstance {
    id: SagaId,
    saga_type: String,
    triggering_event: TriggeringEvent,
    status: SagaStatus,
    executed_steps: Vec<ExecutedStep>,
    compensations: Vec<ExecutedStep>,
    failure: Option<StepFailure>,
    attempt: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SagaInstance {
    /// Creates a new `Pending` instance for the given triggering event.
    pub fn new(id: SagaId, triggering_event: TriggeringEvent) -> Self {
        let now = Utc::now();
        Self {
            id,
            saga_type: DEFAULT_SAGA_TYPE.to_string(),
            triggering_event,
            status: SagaStatus::Pending,
            executed_steps: Vec::new(),
            compensations: Vec::new(),
            failure: None,
            attempt: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the saga type label.
    pub fn with_saga_type(mut self, saga_type: impl Into<String>) -> Self {
        self.saga_type = saga_type.into();
        self
    }

    /// Rebuilds an instance from its persisted parts.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: SagaId,
        saga_type: String,
        triggering_event: TriggeringEvent,
        status: SagaStatus,
        executed_steps: Vec<ExecutedStep>,
        compensations: Vec<ExecutedStep>,
        failure: Option<StepFailure>,
        attempt: u32,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            saga_type,
            triggering_event,
            status,
            executed_steps,
            compensations,
            failure,
            attempt,
            created_at,
            updated_at,
        }
    }

    /// Moves the instance to `next`, enforcing the status state machine.
    pub fn transition(&mut self, next: SagaStatus) -> Result<(), TransitionError> {
        self.status = self.status.transition_to(next)?;
        self.touch();
        Ok(())
    }

    /// Appends a successful forward step to the history.
    pub fn record_step(&mut self, step_name: impl Into<String>, outcome: StepOutcome) {
        self.executed_steps.push(ExecutedStep::now(step_name, outcome));
        self.touch();
    }

    /// Appends a compensation attempt to the history.
    pub fn record_compensation(&mut self, step_name: impl Into<String>, outcome: StepOutcome) {
        self.compensations.push(ExecutedStep::now(step_name, outcome));
        self.touch();
    }

    /// Records the forward step that caused the saga to unwind.
    pub fn record_failure(&mut self, step_name: impl Into<String>, message: impl Into<String>) {
        self.failure = Some(StepFailure {
            step_name: step_name.into(),
            error_message: message.into(),
        });
        self.touch();
    }

    /// Starts a fresh attempt: clears the step logs and failure, returns the
    /// instance to `Pending`, and bumps the attempt counter.
    pub fn reset_for_retry(&mut self) {
        self.executed_steps.clear();
        self.compensations.clear();
        self.failure = None;
        self.status = SagaStatus::Pending;
        self.attempt += 1;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// Query methods
impl SagaInstance {
    pub fn id(&self) -> SagaId {
        self.id
    }

    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    pub fn triggering_event(&self) -> &TriggeringEvent {
        &self.triggering_event
    }

    pub fn status(&self) -> SagaStatus {
        self.status
    }

    /// Returns the forward step log, in execution order.
    pub fn executed_steps(&self) -> &[ExecutedStep] {
        &self.executed_steps
    }

    /// Returns the names of the executed forward steps, in execution order.
    pub fn executed_step_names(&self) -> Vec<&str> {
        self.executed_steps
            .iter()
            .map(|s| s.step_name.as_str())
            .collect()
    }

    /// Returns the compensation log, in the order compensations ran.
    pub fn compensations(&self) -> &[ExecutedStep] {
        &self.compensations
    }

    /// Returns the names of compensations that failed.
    pub fn failed_compensations(&self) -> Vec<&str> {
        self.compensations
            .iter()
            .filter(|c| !c.outcome.success)
            .map(|c| c.step_name.as_str())
            .collect()
    }

    pub fn failure(&self) -> Option<&StepFailure> {
        self.failure.as_ref()
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
