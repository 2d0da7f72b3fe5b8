//! The saga orchestrator: worker pool, per-saga locking and the lifecycle
//! state machine.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use saga_store::{
    SagaId, SagaInstance, SagaQuery, SagaStatistics, SagaStatus, SagaStore, SagaStoreExt,
    StoreError, TriggeringEvent,
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::Instrument;

use crate::compensation::CompensationCoordinator;
use crate::config::{OrchestratorConfig, OverloadPolicy};
use crate::error::{Result, SagaError};
use crate::executor::StepExecutor;
use crate::locks::KeyedLocks;
use crate::registry::StepRegistry;
use crate::result::SagaResult;
use crate::step::SagaStep;

/// Drives saga instances through their lifecycle.
///
/// Every `start`, `retry` and `cancel` runs on a spawned task holding one of
/// `max_concurrent_sagas` worker permits, so the work finishes even if the
/// caller stops waiting. Operations on the same saga ID are serialized;
/// different sagas progress concurrently.
///
/// Cloning is cheap and all clones share the same pool, locks and store.
pub struct SagaOrchestrator<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for SagaOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<S> {
    store: S,
    registry: Arc<StepRegistry>,
    executor: StepExecutor,
    compensator: CompensationCoordinator,
    workers: Arc<Semaphore>,
    overload_policy: OverloadPolicy,
    locks: KeyedLocks<SagaId>,
    cancellations: Mutex<HashMap<SagaId, CancelRequest>>,
    saga_type: String,
}

/// Outstanding `cancel` calls for one saga.
#[derive(Debug, Default)]
struct CancelRequest {
    /// `cancel` calls that have not yet run their own cancel pass.
    waiting: usize,
    /// Set once a worker has unwound the saga in response to the request.
    honored: bool,
}

impl<S> SagaOrchestrator<S>
where
    S: SagaStore + 'static,
{
    /// Creates an orchestrator over `store` running the steps in `registry`.
    pub fn new(store: S, registry: StepRegistry, config: OrchestratorConfig) -> Self {
        let registry = Arc::new(registry);
        let executor = StepExecutor::new(config.executor);
        let compensator = CompensationCoordinator::new(registry.clone(), executor.clone());

        Self {
            inner: Arc::new(Inner {
                store,
                registry,
                executor,
                compensator,
                workers: Arc::new(Semaphore::new(config.max_concurrent_sagas.max(1))),
                overload_policy: config.overload_policy,
                locks: KeyedLocks::new(),
                cancellations: Mutex::new(HashMap::new()),
                saga_type: config.saga_type,
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.inner.registry
    }

    /// Number of idle workers.
    pub fn available_workers(&self) -> usize {
        self.inner.workers.available_permits()
    }

    /// Starts a new saga for `event` under a fresh ID.
    pub async fn start(&self, event: TriggeringEvent) -> Result<SagaResult> {
        self.start_with_id(SagaId::new(), event).await
    }

    /// Starts a new saga under a caller-chosen ID.
    ///
    /// Fails with `AlreadyStarted` if an instance with `id` exists. Step
    /// failures are not errors: they are reported in the returned
    /// [`SagaResult`] after compensation has run.
    #[tracing::instrument(skip(self, event), fields(saga_id = %id, event_type = %event.event_type))]
    pub async fn start_with_id(&self, id: SagaId, event: TriggeringEvent) -> Result<SagaResult> {
        self.dispatch(move |inner| async move { inner.run_start(id, event).await })
            .await
    }

    /// Replays a saga from its first applicable step.
    ///
    /// A completed saga is left untouched and reported as successful.
    #[tracing::instrument(skip(self), fields(saga_id = %id))]
    pub async fn retry(&self, id: SagaId) -> Result<SagaResult> {
        self.dispatch(move |inner| async move { inner.run_retry(id).await })
            .await
    }

    /// Cancels a saga, compensating whatever has executed so far.
    ///
    /// If the saga is running, the request is picked up between two steps.
    /// Fails with `AlreadyCompleted` for a completed saga.
    #[tracing::instrument(skip(self), fields(saga_id = %id))]
    pub async fn cancel(&self, id: SagaId) -> Result<SagaResult> {
        self.inner.request_cancel(id);
        let result = self
            .dispatch(move |inner| async move { inner.run_cancel(id).await })
            .await;
        if matches!(result, Err(SagaError::Overloaded | SagaError::ShuttingDown)) {
            self.inner.release_cancel_request(id);
        }
        result
    }

    /// Returns the current state of a saga.
    pub async fn get_state(&self, id: SagaId) -> Result<SagaInstance> {
        Ok(self.inner.store.load(id).await?)
    }

    /// Lists sagas matching `query`.
    pub async fn list(&self, query: SagaQuery) -> Result<Vec<SagaInstance>> {
        Ok(self.inner.store.find(query).await?)
    }

    /// Counts sagas per status.
    pub async fn statistics(&self) -> Result<SagaStatistics> {
        Ok(self.inner.store.statistics().await?)
    }

    /// Stops accepting new operations. Work already running completes.
    pub fn shutdown(&self) {
        tracing::info!("saga orchestrator shutting down");
        self.inner.workers.close();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.workers.is_closed()
    }

    async fn acquire_worker(&self) -> Result<OwnedSemaphorePermit> {
        let workers = self.inner.workers.clone();
        match self.inner.overload_policy {
            OverloadPolicy::Wait => workers
                .acquire_owned()
                .await
                .map_err(|_| SagaError::ShuttingDown),
            OverloadPolicy::Reject => workers.try_acquire_owned().map_err(|e| match e {
                TryAcquireError::NoPermits => SagaError::Overloaded,
                TryAcquireError::Closed => SagaError::ShuttingDown,
            }),
        }
    }

    async fn dispatch<F, Fut>(&self, work: F) -> Result<SagaResult>
    where
        F: FnOnce(Arc<Inner<S>>) -> Fut,
        Fut: Future<Output = Result<SagaResult>> + Send + 'static,
    {
        let permit = self.acquire_worker().await.inspect_err(|e| {
            tracing::warn!(error = %e, "saga operation not accepted");
        })?;

        let task = work(self.inner.clone());
        let handle = tokio::spawn(
            async move {
                let _permit = permit;
                task.await
            }
            .in_current_span(),
        );

        let result = handle
            .await
            .map_err(|e| SagaError::Worker(e.to_string()))?;
        if let Err(SagaError::Store(e)) = &result {
            tracing::error!(error = %e, "saga store failure, instance left at last persisted state");
        }
        result
    }
}

impl<S> Inner<S>
where
    S: SagaStore + 'static,
{
    async fn run_start(&self, id: SagaId, event: TriggeringEvent) -> Result<SagaResult> {
        let _guard = self.locks.lock(id).await;

        if self.store.exists(id).await? {
            return Err(SagaError::AlreadyStarted(id));
        }

        let instance = SagaInstance::new(id, event).with_saga_type(self.saga_type.as_str());
        self.store.save(&instance).await.map_err(|e| match e {
            StoreError::AlreadyExists(id) => SagaError::AlreadyStarted(id),
            other => other.into(),
        })?;

        metrics::counter!("saga_started_total").increment(1);
        tracing::info!("saga started");
        self.run_forward(instance).await
    }

    async fn run_retry(&self, id: SagaId) -> Result<SagaResult> {
        let _guard = self.locks.lock(id).await;

        let mut instance = self.store.load(id).await?;
        if !instance.status().can_retry() {
            tracing::info!("saga already completed, nothing to retry");
            return Ok(SagaResult::new(
                &instance,
                true,
                "Saga already completed; nothing to retry",
            ));
        }

        let previous = instance.status();
        instance.reset_for_retry();
        self.store.update(&instance).await?;

        metrics::counter!("saga_retried_total").increment(1);
        tracing::info!(%previous, attempt = instance.attempt(), "saga retry started");
        self.run_forward(instance).await
    }

    async fn run_cancel(&self, id: SagaId) -> Result<SagaResult> {
        let _guard = self.locks.lock(id).await;

        let honored_by_worker = self.release_cancel_request(id);
        let mut instance = self.store.load(id).await?;

        match instance.status() {
            SagaStatus::Completed => Err(SagaError::AlreadyCompleted(id)),
            // A running worker saw the request and has already unwound the saga.
            SagaStatus::Cancelled | SagaStatus::Failed if honored_by_worker => {
                Ok(SagaResult::from_cancel(&instance))
            }
            SagaStatus::Cancelled => Ok(SagaResult::new(
                &instance,
                true,
                "Saga was already cancelled",
            )),
            status if status.can_cancel() => {
                let started = Instant::now();
                tracing::info!(%status, "cancelling saga");
                self.compensator
                    .compensate(&self.store, &mut instance, SagaStatus::Cancelled)
                    .await?;
                record_outcome(&instance, started);
                Ok(SagaResult::from_cancel(&instance))
            }
            status => Err(SagaError::InvalidState {
                id,
                status,
                operation: "cancel",
            }),
        }
    }

    /// Runs the forward path and, on the first step failure or a cancel
    /// request, unwinds. The caller holds the saga's lock.
    async fn run_forward(&self, mut instance: SagaInstance) -> Result<SagaResult> {
        let started = Instant::now();
        let id = instance.id();

        instance.transition(SagaStatus::Running)?;
        self.store.update(&instance).await?;

        let steps: Vec<Arc<dyn SagaStep>> = self
            .registry
            .for_each_applicable(instance.triggering_event())
            .cloned()
            .collect();

        for step in steps {
            if self.claim_cancel_request(id) {
                tracing::info!(
                    executed = instance.executed_steps().len(),
                    "cancel requested, unwinding saga"
                );
                self.compensator
                    .compensate(&self.store, &mut instance, SagaStatus::Cancelled)
                    .await?;
                record_outcome(&instance, started);
                return Ok(SagaResult::from_run(&instance));
            }

            tracing::info!(step = step.name(), "saga step started");
            let outcome = self
                .executor
                .run(step.as_ref(), instance.triggering_event())
                .await;

            if !outcome.success {
                tracing::warn!(
                    step = step.name(),
                    error = outcome.message(),
                    "saga step failed, compensating"
                );
                instance.record_failure(step.name(), outcome.message());
                self.compensator
                    .compensate(&self.store, &mut instance, SagaStatus::Compensated)
                    .await?;
                record_outcome(&instance, started);
                return Ok(SagaResult::from_run(&instance));
            }

            instance.record_step(step.name(), outcome);
            self.store.update(&instance).await?;
            tracing::info!(step = step.name(), "saga step completed");
        }

        instance.transition(SagaStatus::Completed)?;
        self.store.update(&instance).await?;
        tracing::info!(
            steps = instance.executed_steps().len(),
            "saga completed successfully"
        );
        record_outcome(&instance, started);
        Ok(SagaResult::from_run(&instance))
    }

    fn request_cancel(&self, id: SagaId) {
        self.cancellations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_default()
            .waiting += 1;
    }

    /// Marks a waiting cancel request as honored by the running worker.
    /// Returns false if there is nothing to honor.
    fn claim_cancel_request(&self, id: SagaId) -> bool {
        let mut cancellations = self
            .cancellations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match cancellations.get_mut(&id) {
            Some(request) if !request.honored => {
                request.honored = true;
                true
            }
            _ => false,
        }
    }

    /// Withdraws one `cancel` call's request and reports whether a worker
    /// honored it. The entry is dropped once no call is waiting on it.
    fn release_cancel_request(&self, id: SagaId) -> bool {
        let mut cancellations = self
            .cancellations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(request) = cancellations.get_mut(&id) else {
            return false;
        };
        let honored = request.honored;
        request.waiting = request.waiting.saturating_sub(1);
        if request.waiting == 0 {
            cancellations.remove(&id);
        }
        honored
    }
}

fn record_outcome(instance: &SagaInstance, started: Instant) {
    let counter = match instance.status() {
        SagaStatus::Completed => "saga_completed_total",
        SagaStatus::Compensated => "saga_compensated_total",
        SagaStatus::Cancelled => "saga_cancelled_total",
        SagaStatus::Failed => "saga_failed_total",
        _ => return,
    };
    metrics::counter!(counter).increment(1);
    metrics::histogram!("saga_duration_seconds", "status" => instance.status().as_str())
        .record(started.elapsed().as_secs_f64());
}
