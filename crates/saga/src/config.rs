//! Orchestrator and executor configuration.

use std::str::FromStr;
use std::time::Duration;

use saga_store::DEFAULT_SAGA_TYPE;

/// What happens to a new operation when every worker is busy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverloadPolicy {
    /// Wait until a worker frees up.
    #[default]
    Wait,
    /// Fail immediately with `SagaError::Overloaded`.
    Reject,
}

impl FromStr for OverloadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wait" => Ok(OverloadPolicy::Wait),
            "reject" => Ok(OverloadPolicy::Reject),
            other => Err(format!("unknown overload policy: {other}")),
        }
    }
}

/// Timeout and retry policy applied to every step invocation.
///
/// Reads from environment variables (see [`OrchestratorConfig::from_env`]):
/// - `SAGA_STEP_TIMEOUT_MS` (default: `30000`)
/// - `SAGA_STEP_MAX_ATTEMPTS` (default: `3`)
/// - `SAGA_RETRY_BACKOFF_MS` (default: `100`)
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    pub step_timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
}

impl ExecutorConfig {
    /// Delay before the attempt following `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(30),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Orchestrator configuration.
///
/// Reads from environment variables:
/// - `SAGA_MAX_CONCURRENCY`: worker pool size (default: `10`)
/// - `SAGA_OVERLOAD_POLICY`: `wait` or `reject` (default: `wait`)
/// - plus the executor variables listed on [`ExecutorConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub max_concurrent_sagas: usize,
    pub overload_policy: OverloadPolicy,
    /// Type label stored on every instance this orchestrator creates.
    pub saga_type: String,
    pub executor: ExecutorConfig,
}

impl OrchestratorConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            max_concurrent_sagas: parsed("SAGA_MAX_CONCURRENCY")
                .filter(|n| *n > 0)
                .map(|n| n as usize)
                .unwrap_or(defaults.max_concurrent_sagas),
            overload_policy: lookup("SAGA_OVERLOAD_POLICY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.overload_policy),
            saga_type: defaults.saga_type,
            executor: ExecutorConfig {
                step_timeout: parsed("SAGA_STEP_TIMEOUT_MS")
                    .filter(|n| *n > 0)
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.executor.step_timeout),
                max_attempts: parsed("SAGA_STEP_MAX_ATTEMPTS")
                    .filter(|n| *n > 0)
                    .map(|n| n as u32)
                    .unwrap_or(defaults.executor.max_attempts),
                initial_backoff: parsed("SAGA_RETRY_BACKOFF_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.executor.initial_backoff),
                ..defaults.executor
            },
        }
    }

    pub fn with_max_concurrent_sagas(mut self, max: usize) -> Self {
        self.max_concurrent_sagas = max.max(1);
        self
    }

    pub fn with_overload_policy(mut self, policy: OverloadPolicy) -> Self {
        self.overload_policy = policy;
        self
    }

    pub fn with_saga_type(mut self, saga_type: impl Into<String>) -> Self {
        self.saga_type = saga_type.into();
        self
    }

    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sagas: 10,
            overload_policy: OverloadPolicy::Wait,
            saga_type: DEFAULT_SAGA_TYPE.to_string(),
            executor: ExecutorConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(vars: &[(&str, &str)]) -> OrchestratorConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        OrchestratorConfig::from_vars(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_concurrent_sagas, 10);
        assert_eq!(config.overload_policy, OverloadPolicy::Wait);
        assert_eq!(config.executor.step_timeout, Duration::from_secs(30));
        assert_eq!(config.executor.max_attempts, 3);
    }

    #[test]
    fn test_values_from_environment() {
        let config = from_map(&[
            ("SAGA_MAX_CONCURRENCY", "4"),
            ("SAGA_OVERLOAD_POLICY", "Reject"),
            ("SAGA_STEP_TIMEOUT_MS", "250"),
            ("SAGA_STEP_MAX_ATTEMPTS", "5"),
            ("SAGA_RETRY_BACKOFF_MS", "20"),
        ]);

        assert_eq!(config.max_concurrent_sagas, 4);
        assert_eq!(config.overload_policy, OverloadPolicy::Reject);
        assert_eq!(config.executor.step_timeout, Duration::from_millis(250));
        assert_eq!(config.executor.max_attempts, 5);
        assert_eq!(config.executor.initial_backoff, Duration::from_millis(20));
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let config = from_map(&[
            ("SAGA_MAX_CONCURRENCY", "0"),
            ("SAGA_OVERLOAD_POLICY", "sometimes"),
            ("SAGA_STEP_MAX_ATTEMPTS", "many"),
        ]);

        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn test_zero_step_timeout_falls_back_to_default() {
        let config = from_map(&[("SAGA_STEP_TIMEOUT_MS", "0")]);

        assert_eq!(config.executor.step_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let config = ExecutorConfig {
            initial_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_millis(350),
            ..ExecutorConfig::default()
        };

        assert_eq!(config.backoff_for(1), Duration::from_millis(100));
        assert_eq!(config.backoff_for(2), Duration::from_millis(200));
        assert_eq!(config.backoff_for(3), Duration::from_millis(350));
    }
}
