use serde::Serialize;

use saga_store::{SagaId, SagaInstance, SagaStatus};

/// Outcome of an orchestrator operation.
///
/// `success` is true when the operation achieved what the caller asked
/// for: a started or retried saga completed, or a cancel unwound cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SagaResult {
    pub saga_id: SagaId,
    pub success: bool,
    pub status: SagaStatus,
    pub message: String,
}

impl SagaResult {
    pub fn new(instance: &SagaInstance, success: bool, message: impl Into<String>) -> Self {
        Self {
            saga_id: instance.id(),
            success,
            status: instance.status(),
            message: message.into(),
        }
    }

    /// Summarises a saga that ran forward and possibly unwound.
    pub(crate) fn from_run(instance: &SagaInstance) -> Self {
        match (instance.status(), instance.failure()) {
            (SagaStatus::Completed, _) => Self::new(instance, true, "Saga completed successfully"),
            (SagaStatus::Compensated, Some(failure)) => Self::new(
                instance,
                false,
                format!(
                    "Saga compensated after step '{}' failed: {}",
                    failure.step_name, failure.error_message
                ),
            ),
            (SagaStatus::Failed, _) => Self::new(
                instance,
                false,
                format!(
                    "Saga failed: compensation did not complete for {}",
                    instance.failed_compensations().join(", ")
                ),
            ),
            (SagaStatus::Cancelled, _) => Self::new(instance, false, "Saga was cancelled"),
            (status, _) => Self::new(instance, false, format!("Saga ended in status {status}")),
        }
    }

    /// Summarises a cancel request once the saga has unwound.
    pub(crate) fn from_cancel(instance: &SagaInstance) -> Self {
        match instance.status() {
            SagaStatus::Cancelled => Self::new(instance, true, "Saga cancelled"),
            SagaStatus::Failed => Self::new(
                instance,
                false,
                format!(
                    "Saga cancelled but compensation did not complete for {}",
                    instance.failed_compensations().join(", ")
                ),
            ),
            _ => Self::from_run(instance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saga_store::{StepOutcome, TriggeringEvent};

    fn saga() -> SagaInstance {
        let mut saga = SagaInstance::new(
            SagaId::new(),
            TriggeringEvent::new("OrderCreated", serde_json::json!({})),
        );
        saga.transition(SagaStatus::Running).unwrap();
        saga
    }

    #[test]
    fn test_completed_result() {
        let mut saga = saga();
        saga.transition(SagaStatus::Completed).unwrap();

        let result = SagaResult::from_run(&saga);
        assert!(result.success);
        assert_eq!(result.status, SagaStatus::Completed);
        assert_eq!(result.saga_id, saga.id());
    }

    #[test]
    fn test_compensated_result_names_failed_step() {
        let mut saga = saga();
        saga.record_failure("charge_payment", "card declined");
        saga.transition(SagaStatus::Compensating).unwrap();
        saga.transition(SagaStatus::Compensated).unwrap();

        let result = SagaResult::from_run(&saga);
        assert!(!result.success);
        assert_eq!(
            result.message,
            "Saga compensated after step 'charge_payment' failed: card declined"
        );
    }

    #[test]
    fn test_failed_result_names_failed_compensations() {
        let mut saga = saga();
        saga.record_step("reserve_inventory", StepOutcome::success());
        saga.transition(SagaStatus::Compensating).unwrap();
        saga.record_compensation("reserve_inventory", StepOutcome::failure("timeout"));
        saga.transition(SagaStatus::Failed).unwrap();

        let result = SagaResult::from_run(&saga);
        assert_eq!(
            result.message,
            "Saga failed: compensation did not complete for reserve_inventory"
        );
    }

    #[test]
    fn test_cancel_result() {
        let mut saga = saga();
        saga.transition(SagaStatus::Compensating).unwrap();
        saga.transition(SagaStatus::Cancelled).unwrap();

        let result = SagaResult::from_cancel(&saga);
        assert!(result.success);
        assert_eq!(result.message, "Saga cancelled");
    }

    #[test]
    fn test_serializes_status_name() {
        let mut saga = saga();
        saga.transition(SagaStatus::Completed).unwrap();

        let json = serde_json::to_value(SagaResult::from_run(&saga)).unwrap();
        assert_eq!(json["status"], "Completed");
        assert_eq!(json["success"], true);
    }
}
