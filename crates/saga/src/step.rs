//! The step contract and a closure-backed step.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use saga_store::{StepOutcome, TriggeringEvent};

/// One unit of work in a saga.
///
/// Every step receives the saga's triggering event for both its forward
/// action and its compensation. `execute` may run more than once for the
/// same saga (executor retries, operator retries), so implementations must
/// be idempotent.
///
/// Compensation is a capability: a step opts in by returning `true` from
/// [`SagaStep::has_compensation`] and overriding [`SagaStep::compensate`].
/// Steps without compensation are skipped when a saga unwinds.
#[async_trait]
pub trait SagaStep: Send + Sync {
    /// Unique name within a registry.
    fn name(&self) -> &str;

    /// Decides whether this step participates in a saga for `event`.
    ///
    /// Must be deterministic for a given event.
    fn is_applicable(&self, _event: &TriggeringEvent) -> bool {
        true
    }

    /// Forward action.
    async fn execute(&self, event: &TriggeringEvent) -> StepOutcome;

    /// Returns true if the step can be compensated.
    fn has_compensation(&self) -> bool {
        false
    }

    /// Inverse action. The default is a successful no-op.
    async fn compensate(&self, _event: &TriggeringEvent) -> StepOutcome {
        StepOutcome::success()
    }
}

type Action = Arc<dyn Fn(TriggeringEvent) -> BoxFuture<'static, StepOutcome> + Send + Sync>;
type Predicate = Arc<dyn Fn(&TriggeringEvent) -> bool + Send + Sync>;

fn boxed<F, Fut>(f: F) -> Action
where
    F: Fn(TriggeringEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StepOutcome> + Send + 'static,
{
    Arc::new(move |event: TriggeringEvent| -> BoxFuture<'static, StepOutcome> {
        Box::pin(f(event))
    })
}

/// A step built from closures.
///
/// ```
/// use saga::{FnStep, StepOutcome};
///
/// let step = FnStep::new("reserve_inventory", |_event| async { StepOutcome::success() })
///     .with_compensation(|_event| async { StepOutcome::success() })
///     .when(|event| event.is_type("OrderCreated"));
/// ```
#[derive(Clone)]
pub struct FnStep {
    name: String,
    execute: Action,
    compensate: Option<Action>,
    applicable: Option<Predicate>,
}

impl FnStep {
    /// Creates a step with a forward action and no compensation.
    pub fn new<F, Fut>(name: impl Into<String>, execute: F) -> Self
    where
        F: Fn(TriggeringEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StepOutcome> + Send + 'static,
    {
        Self {
            name: name.into(),
            execute: boxed(execute),
            compensate: None,
            applicable: None,
        }
    }

    /// Adds a compensating action.
    pub fn with_compensation<F, Fut>(mut self, compensate: F) -> Self
    where
        F: Fn(TriggeringEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StepOutcome> + Send + 'static,
    {
        self.compensate = Some(boxed(compensate));
        self
    }

    /// Restricts the step to events matching `predicate`.
    pub fn when<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&TriggeringEvent) -> bool + Send + Sync + 'static,
    {
        self.applicable = Some(Arc::new(predicate));
        self
    }
}

impl std::fmt::Debug for FnStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep")
            .field("name", &self.name)
            .field("has_compensation", &self.compensate.is_some())
            .finish()
    }
}

#[async_trait]
impl SagaStep for FnStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_applicable(&self, event: &TriggeringEvent) -> bool {
        self.applicable.as_ref().is_none_or(|p| p(event))
    }

    async fn execute(&self, event: &TriggeringEvent) -> StepOutcome {
        (self.execute)(event.clone()).await
    }

    fn has_compensation(&self) -> bool {
        self.compensate.is_some()
    }

    async fn compensate(&self, event: &TriggeringEvent) -> StepOutcome {
        match &self.compensate {
            Some(compensate) => compensate(event.clone()).await,
            None => StepOutcome::success(),
        }
    }
}
