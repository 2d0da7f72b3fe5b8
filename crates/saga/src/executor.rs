//! Runs a single step with a timeout and bounded retries.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures_util::FutureExt;
use saga_store::{StepOutcome, TriggeringEvent};

use crate::config::ExecutorConfig;
use crate::step::SagaStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Execute,
    Compensate,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Execute => "execute",
            Phase::Compensate => "compensate",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Executes step actions under the configured timeout and retry policy.
///
/// Failures never escape as errors: a timed out, panicking or failing
/// attempt is retried with exponential backoff, and once attempts are
/// exhausted the last failure is returned as a failed [`StepOutcome`].
#[derive(Debug, Clone, Default)]
pub struct StepExecutor {
    config: ExecutorConfig,
}

impl StepExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Runs the forward action of `step`.
    pub async fn run(&self, step: &dyn SagaStep, event: &TriggeringEvent) -> StepOutcome {
        self.run_with_policy(step, event, Phase::Execute).await
    }

    /// Runs the compensating action of `step`.
    ///
    /// A step without compensation succeeds without being invoked.
    pub async fn run_compensation(
        &self,
        step: &dyn SagaStep,
        event: &TriggeringEvent,
    ) -> StepOutcome {
        if !step.has_compensation() {
            return StepOutcome::success();
        }
        self.run_with_policy(step, event, Phase::Compensate).await
    }

    async fn run_with_policy(
        &self,
        step: &dyn SagaStep,
        event: &TriggeringEvent,
        phase: Phase,
    ) -> StepOutcome {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let outcome = self.attempt(step, event, phase).await;
            if outcome.success {
                return outcome;
            }

            metrics::counter!(
                "saga_step_failures_total",
                "step" => step.name().to_string(),
                "phase" => phase.as_str()
            )
            .increment(1);

            if attempt >= max_attempts {
                tracing::warn!(
                    step = step.name(),
                    %phase,
                    attempts = attempt,
                    error = outcome.message(),
                    "step attempts exhausted"
                );
                return outcome;
            }

            let delay = self.config.backoff_for(attempt);
            tracing::debug!(
                step = step.name(),
                %phase,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = outcome.message(),
                "step attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, step: &dyn SagaStep, event: &TriggeringEvent, phase: Phase) -> StepOutcome {
        metrics::counter!(
            "saga_step_attempts_total",
            "step" => step.name().to_string(),
            "phase" => phase.as_str()
        )
        .increment(1);
        let started = Instant::now();

        let action = async {
            match phase {
                Phase::Execute => step.execute(event).await,
                Phase::Compensate => step.compensate(event).await,
            }
        };
        let guarded = AssertUnwindSafe(action).catch_unwind();

        let outcome = match tokio::time::timeout(self.config.step_timeout, guarded).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_panic)) => StepOutcome::failure(format!("step '{}' panicked", step.name())),
            Err(_elapsed) => StepOutcome::failure(format!(
                "step '{}' timed out after {}ms",
                step.name(),
                self.config.step_timeout.as_millis()
            )),
        };

        metrics::histogram!(
            "saga_step_duration_seconds",
            "step" => step.name().to_string(),
            "phase" => phase.as_str()
        )
        .record(started.elapsed().as_secs_f64());

        outcome
    }
}
