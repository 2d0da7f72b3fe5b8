//! Best-effort reverse unwinding of executed steps.

use std::collections::HashSet;
use std::sync::Arc;

use saga_store::{SagaInstance, SagaStatus, SagaStore, StepOutcome};

use crate::error::Result;
use crate::executor::StepExecutor;
use crate::registry::StepRegistry;

/// What happened while unwinding a saga.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompensationReport {
    /// Steps whose compensation succeeded, in the order they ran.
    pub compensated: Vec<String>,
    /// Steps whose compensation failed or could not be found.
    pub failed: Vec<String>,
}

impl CompensationReport {
    /// True if nothing is left to undo by hand.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Replays compensations for a saga's executed steps in reverse order.
///
/// A failing compensation is recorded and the remaining (earlier) steps are
/// still compensated. Only store failures abort the unwind.
#[derive(Debug, Clone)]
pub struct CompensationCoordinator {
    registry: Arc<StepRegistry>,
    executor: StepExecutor,
}

impl CompensationCoordinator {
    pub fn new(registry: Arc<StepRegistry>, executor: StepExecutor) -> Self {
        Self { registry, executor }
    }

    /// Unwinds `instance` and moves it to a terminal status.
    ///
    /// The instance ends in `on_success` (`Compensated`, or `Cancelled` for
    /// an operator cancel) when every compensation succeeds, and in `Failed`
    /// otherwise. Each recorded compensation is persisted before the next
    /// one runs. Steps already compensated successfully in this attempt are
    /// not compensated again.
    #[tracing::instrument(skip(self, store, instance), fields(saga_id = %instance.id()))]
    pub async fn compensate<S>(
        &self,
        store: &S,
        instance: &mut SagaInstance,
        on_success: SagaStatus,
    ) -> Result<CompensationReport>
    where
        S: SagaStore + ?Sized,
    {
        if instance.status() != SagaStatus::Compensating {
            instance.transition(SagaStatus::Compensating)?;
            store.update(instance).await?;
        }

        let already_done: HashSet<String> = instance
            .compensations()
            .iter()
            .filter(|entry| entry.outcome.success)
            .map(|entry| entry.step_name.clone())
            .collect();

        let pending: Vec<String> = instance
            .executed_steps()
            .iter()
            .rev()
            .filter(|entry| entry.outcome.success && !already_done.contains(&entry.step_name))
            .map(|entry| entry.step_name.clone())
            .collect();

        let mut report = CompensationReport::default();
        for step_name in pending {
            let outcome = match self.registry.get(&step_name) {
                Some(step) if !step.has_compensation() => {
                    tracing::debug!(step = %step_name, "step has no compensation, skipping");
                    continue;
                }
                Some(step) => {
                    tracing::info!(step = %step_name, "compensating step");
                    self.executor
                        .run_compensation(step.as_ref(), instance.triggering_event())
                        .await
                }
                None => StepOutcome::failure(format!(
                    "step '{step_name}' is no longer registered"
                )),
            };

            let label = if outcome.success { "success" } else { "failure" };
            metrics::counter!("saga_compensations_total", "outcome" => label).increment(1);

            if outcome.success {
                report.compensated.push(step_name.clone());
            } else {
                tracing::warn!(
                    step = %step_name,
                    error = outcome.message(),
                    "compensation failed, continuing with earlier steps"
                );
                report.failed.push(step_name.clone());
            }

            instance.record_compensation(step_name, outcome);
            store.update(instance).await?;
        }

        let final_status = if report.is_complete() {
            on_success
        } else {
            SagaStatus::Failed
        };
        instance.transition(final_status)?;
        store.update(instance).await?;

        tracing::info!(
            status = %final_status,
            compensated = report.compensated.len(),
            failed = report.failed.len(),
            "compensation finished"
        );
        Ok(report)
    }
}
