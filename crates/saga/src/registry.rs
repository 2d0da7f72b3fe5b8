//! Ordered, immutable step registry.

use std::collections::HashSet;
use std::sync::Arc;

use saga_store::TriggeringEvent;

use crate::error::{Result, SagaError};
use crate::step::SagaStep;

/// The ordered sequence of steps a saga runs.
///
/// Built once at startup with [`StepRegistry::builder`] and shared read-only
/// afterwards. Step names are unique, so compensation can look steps up by
/// the names recorded in a saga's history.
#[derive(Clone, Default)]
pub struct StepRegistry {
    steps: Vec<Arc<dyn SagaStep>>,
}

impl StepRegistry {
    /// Starts building a registry.
    pub fn builder() -> StepRegistryBuilder {
        StepRegistryBuilder::default()
    }

    /// Returns the steps applicable to `event`, in registration order.
    ///
    /// The result only depends on the registry contents and the event, so
    /// repeated calls (for example on retry) yield the same sequence.
    pub fn for_each_applicable<'a>(
        &'a self,
        event: &'a TriggeringEvent,
    ) -> impl Iterator<Item = &'a Arc<dyn SagaStep>> + 'a {
        self.steps.iter().filter(move |step| step.is_applicable(event))
    }

    /// Looks up a step by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn SagaStep>> {
        self.steps.iter().find(|step| step.name() == name)
    }

    /// Step names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("steps", &self.names())
            .finish()
    }
}

/// Builder for [`StepRegistry`].
#[derive(Default)]
pub struct StepRegistryBuilder {
    steps: Vec<Arc<dyn SagaStep>>,
}

impl StepRegistryBuilder {
    /// Appends a step.
    pub fn step(mut self, step: impl SagaStep + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Appends an already shared step.
    pub fn shared_step(mut self, step: Arc<dyn SagaStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Finishes the registry, rejecting duplicate step names.
    pub fn build(self) -> Result<StepRegistry> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name()) {
                return Err(SagaError::DuplicateStep(step.name().to_string()));
            }
        }
        Ok(StepRegistry { steps: self.steps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::FnStep;
    use saga_store::StepOutcome;

    fn noop(name: &str) -> FnStep {
        FnStep::new(name, |_| async { StepOutcome::success() })
    }

    #[test]
    fn test_registration_order_is_preserved() {
        let registry = StepRegistry::builder()
            .step(noop("reserve_inventory"))
            .step(noop("charge_payment"))
            .step(noop("confirm_order"))
            .build()
            .unwrap();

        assert_eq!(
            registry.names(),
            vec!["reserve_inventory", "charge_payment", "confirm_order"]
        );
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let result = StepRegistry::builder()
            .step(noop("charge_payment"))
            .step(noop("charge_payment"))
            .build();

        assert!(matches!(result, Err(SagaError::DuplicateStep(name)) if name == "charge_payment"));
    }

    #[test]
    fn test_applicable_steps_are_filtered_and_stable() {
        let registry = StepRegistry::builder()
            .step(noop("a"))
            .step(noop("b").when(|e| e.is_type("Other")))
            .step(noop("c"))
            .build()
            .unwrap();
        let event = TriggeringEvent::new("OrderCreated", serde_json::json!({}));

        let first: Vec<_> = registry
            .for_each_applicable(&event)
            .map(|s| s.name().to_string())
            .collect();
        let second: Vec<_> = registry
            .for_each_applicable(&event)
            .map(|s| s.name().to_string())
            .collect();

        assert_eq!(first, vec!["a", "c"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_lookup_by_name() {
        let registry = StepRegistry::builder()
            .step(noop("a"))
            .build()
            .unwrap();

        assert!(registry.get("a").is_some());
        assert!(registry.get("missing").is_none());
        assert!(!registry.is_empty());
    }
}
