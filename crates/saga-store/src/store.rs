use async_trait::async_trait;

use crate::{Result, SagaId, SagaInstance, SagaQuery, SagaStatistics, StoreError};

/// Core trait for saga state storage.
///
/// Implementations must be safe to share between many concurrently running
/// sagas. The orchestrator guarantees a single writer per saga ID; the store
/// only has to make each `update` atomic so readers never observe a
/// half-written record. Failures are returned as-is and never retried here.
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Persists a newly created instance.
    ///
    /// Fails with `AlreadyExists` if an instance with the same ID is stored.
    async fn save(&self, instance: &SagaInstance) -> Result<()>;

    /// Loads an instance by ID.
    ///
    /// Fails with `NotFound` if no instance exists.
    async fn load(&self, id: SagaId) -> Result<SagaInstance>;

    /// Atomically replaces the stored record with `instance`.
    ///
    /// Fails with `NotFound` if the instance was never saved, and with
    /// `HistoryRewrite` if the update would drop step history
    /// (see [`validate_update`]).
    async fn update(&self, instance: &SagaInstance) -> Result<()>;

    /// Lists instances matching a query, oldest first.
    async fn find(&self, query: SagaQuery) -> Result<Vec<SagaInstance>>;

    /// Counts instances per status.
    async fn statistics(&self) -> Result<SagaStatistics>;
}

/// Extension trait providing convenience methods for saga stores.
#[async_trait]
pub trait SagaStoreExt: SagaStore {
    /// Loads an instance, mapping `NotFound` to `None`.
    async fn try_load(&self, id: SagaId) -> Result<Option<SagaInstance>> {
        match self.load(id).await {
            Ok(instance) => Ok(Some(instance)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Checks if an instance exists.
    async fn exists(&self, id: SagaId) -> Result<bool> {
        Ok(self.try_load(id).await?.is_some())
    }
}

// Blanket implementation for all SagaStore implementations
impl<T: SagaStore + ?Sized> SagaStoreExt for T {}

/// Checks that replacing `current` with `next` keeps the step history intact.
///
/// Within one attempt both logs may only grow, and a terminal instance may
/// not gain further forward steps. A retry (higher attempt number) starts
/// fresh logs; going back to an older attempt is rejected as stale.
pub fn validate_update(current: &SagaInstance, next: &SagaInstance) -> Result<()> {
    let reject = |reason: String| {
        Err(StoreError::HistoryRewrite {
            id: next.id(),
            reason,
        })
    };

    if next.attempt() < current.attempt() {
        return reject(format!(
            "stale attempt {} (stored attempt is {})",
            next.attempt(),
            current.attempt()
        ));
    }

    if next.attempt() > current.attempt() {
        return Ok(());
    }

    if !next.executed_steps().starts_with(current.executed_steps()) {
        return reject("executed steps are append-only".to_string());
    }

    if !next.compensations().starts_with(current.compensations()) {
        return reject("compensation log is append-only".to_string());
    }

    if current.is_terminal() && next.executed_steps().len() > current.executed_steps().len() {
        return reject(format!(
            "no steps may execute once the saga is {}",
            current.status()
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SagaStatus, StepOutcome, TriggeringEvent};

    fn running_instance() -> SagaInstance {
        let mut saga = SagaInstance::new(
            SagaId::new(),
            TriggeringEvent::new("Ping", serde_json::json!({})),
        );
        saga.transition(SagaStatus::Running).unwrap();
        saga
    }

    #[test]
    fn test_appending_steps_is_valid() {
        let current = running_instance();
        let mut next = current.clone();
        next.record_step("a", StepOutcome::success());
        assert!(validate_update(&current, &next).is_ok());
    }

    #[test]
    fn test_dropping_steps_is_rejected() {
        let mut current = running_instance();
        current.record_step("a", StepOutcome::success());
        let next = SagaInstance::from_parts(
            current.id(),
            current.saga_type().to_string(),
            current.triggering_event().clone(),
            current.status(),
            vec![],
            vec![],
            None,
            current.attempt(),
            current.created_at(),
            current.updated_at(),
        );

        let err = validate_update(&current, &next).unwrap_err();
        assert!(matches!(err, StoreError::HistoryRewrite { .. }));
    }

    #[test]
    fn test_terminal_instance_cannot_gain_steps() {
        let mut current = running_instance();
        current.transition(SagaStatus::Completed).unwrap();
        let mut next = current.clone();
        next.record_step("late", StepOutcome::success());

        assert!(validate_update(&current, &next).is_err());
    }

    #[test]
    fn test_retry_may_clear_history() {
        let mut current = running_instance();
        current.record_step("a", StepOutcome::success());
        let mut next = current.clone();
        next.reset_for_retry();

        assert!(validate_update(&current, &next).is_ok());
        assert!(validate_update(&next, &current).is_err());
    }
}
