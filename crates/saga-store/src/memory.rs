use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    Result, SagaId, SagaInstance, SagaQuery, SagaStatistics, StoreError,
    store::{SagaStore, validate_update},
};

#[derive(Debug, Default)]
struct FaultToggles {
    fail_on_save: AtomicBool,
    fail_on_update: AtomicBool,
    fail_on_load: AtomicBool,
}

/// In-memory saga store.
///
/// Clones share the same underlying map. This implementation provides the
/// same interface as the PostgreSQL implementation and adds fault toggles to
/// simulate an unavailable backend in tests.
#[derive(Debug, Clone, Default)]
pub struct InMemorySagaStore {
    instances: Arc<RwLock<HashMap<SagaId, SagaInstance>>>,
    faults: Arc<FaultToggles>,
}

impl InMemorySagaStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored instances.
    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }

    /// Returns true if no instance is stored.
    pub async fn is_empty(&self) -> bool {
        self.instances.read().await.is_empty()
    }

    /// Removes all instances.
    pub async fn clear(&self) {
        self.instances.write().await.clear();
    }

    /// Makes subsequent `save` calls fail with `Unavailable`.
    pub fn set_fail_on_save(&self, fail: bool) {
        self.faults.fail_on_save.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent `update` calls fail with `Unavailable`.
    pub fn set_fail_on_update(&self, fail: bool) {
        self.faults.fail_on_update.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent `load` calls fail with `Unavailable`.
    pub fn set_fail_on_load(&self, fail: bool) {
        self.faults.fail_on_load.store(fail, Ordering::SeqCst);
    }

    fn check_fault(flag: &AtomicBool, operation: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "simulated failure on {operation}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    async fn save(&self, instance: &SagaInstance) -> Result<()> {
        Self::check_fault(&self.faults.fail_on_save, "save")?;

        let mut instances = self.instances.write().await;
        if instances.contains_key(&instance.id()) {
            return Err(StoreError::AlreadyExists(instance.id()));
        }
        instances.insert(instance.id(), instance.clone());
        Ok(())
    }

    async fn load(&self, id: SagaId) -> Result<SagaInstance> {
        Self::check_fault(&self.faults.fail_on_load, "load")?;

        self.instances
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn update(&self, instance: &SagaInstance) -> Result<()> {
        Self::check_fault(&self.faults.fail_on_update, "update")?;

        // Validation and replacement happen under one write guard, so readers
        // see either the old record or the new one.
        let mut instances = self.instances.write().await;
        let current = instances
            .get_mut(&instance.id())
            .ok_or(StoreError::NotFound(instance.id()))?;
        validate_update(current, instance)?;
        *current = instance.clone();
        Ok(())
    }

    async fn find(&self, query: SagaQuery) -> Result<Vec<SagaInstance>> {
        let instances = self.instances.read().await;
        let mut matching: Vec<_> = instances
            .values()
            .filter(|instance| query.matches(instance))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then(a.id().cmp(&b.id()))
        });

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn statistics(&self) -> Result<SagaStatistics> {
        let instances = self.instances.read().await;
        Ok(instances.values().map(SagaInstance::status).collect())
    }
}
