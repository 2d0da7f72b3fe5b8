//! Saga lifecycle state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::StoreError;

/// The status of a saga instance in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Running ──┬──► Completed
///                       ├──► Compensating ──┬──► Compensated
///                       │                   ├──► Failed
///                       │                   └──► Cancelled
///                       └──► Cancelled
/// ```
///
/// `Completed`, `Compensated`, `Cancelled` and `Failed` are terminal. The
/// only way out of a terminal status is an explicit retry, which resets the
/// instance to `Pending` for a fresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaStatus {
    /// Created but no step has been attempted yet.
    #[default]
    Pending,

    /// Forward steps are being executed.
    Running,

    /// All applicable steps succeeded (terminal).
    Completed,

    /// Executed steps are being compensated in reverse order.
    Compensating,

    /// Every compensation succeeded after a failure (terminal).
    Compensated,

    /// Cancelled by an operator; executed steps were compensated (terminal).
    Cancelled,

    /// One or more compensations could not be completed (terminal).
    /// Requires operator attention.
    Failed,
}

/// Error returned when a status change is not allowed by the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid saga status transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: SagaStatus,
    pub to: SagaStatus,
}

impl SagaStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [SagaStatus; 7] = [
        SagaStatus::Pending,
        SagaStatus::Running,
        SagaStatus::Completed,
        SagaStatus::Compensating,
        SagaStatus::Compensated,
        SagaStatus::Cancelled,
        SagaStatus::Failed,
    ];

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStatus::Completed
                | SagaStatus::Compensated
                | SagaStatus::Cancelled
                | SagaStatus::Failed
        )
    }

    /// Returns true if an operator cancel may act on a saga in this status.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            SagaStatus::Pending | SagaStatus::Running | SagaStatus::Compensating
        )
    }

    /// Returns true if the saga may be replayed from scratch.
    pub fn can_retry(&self) -> bool {
        !matches!(self, SagaStatus::Completed)
    }

    /// Returns true if the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: SagaStatus) -> bool {
        use SagaStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Compensating)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Compensating)
                | (Running, Cancelled)
                | (Compensating, Compensated)
                | (Compensating, Failed)
                | (Compensating, Cancelled)
        )
    }

    /// Validates a transition, returning the target status on success.
    pub fn transition_to(&self, next: SagaStatus) -> Result<SagaStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: *self,
                to: next,
            })
        }
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Pending => "Pending",
            SagaStatus::Running => "Running",
            SagaStatus::Completed => "Completed",
            SagaStatus::Compensating => "Compensating",
            SagaStatus::Compensated => "Compensated",
            SagaStatus::Cancelled => "Cancelled",
            SagaStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SagaStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SagaStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StoreError::UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(SagaStatus::default(), SagaStatus::Pending);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!SagaStatus::Pending.is_terminal());
        assert!(!SagaStatus::Running.is_terminal());
        assert!(!SagaStatus::Compensating.is_terminal());
        assert!(SagaStatus::Completed.is_terminal());
        assert!(SagaStatus::Compensated.is_terminal());
        assert!(SagaStatus::Cancelled.is_terminal());
        assert!(SagaStatus::Failed.is_terminal());
    }

    #[test]
    fn test_forward_path() {
        assert!(SagaStatus::Pending.can_transition_to(SagaStatus::Running));
        assert!(SagaStatus::Running.can_transition_to(SagaStatus::Completed));
        assert!(SagaStatus::Running.can_transition_to(SagaStatus::Compensating));
        assert!(!SagaStatus::Pending.can_transition_to(SagaStatus::Completed));
    }

    #[test]
    fn test_compensation_path() {
        assert!(SagaStatus::Compensating.can_transition_to(SagaStatus::Compensated));
        assert!(SagaStatus::Compensating.can_transition_to(SagaStatus::Failed));
        assert!(SagaStatus::Compensating.can_transition_to(SagaStatus::Cancelled));
        assert!(!SagaStatus::Compensating.can_transition_to(SagaStatus::Completed));
    }

    #[test]
    fn test_terminal_statuses_have_no_exits() {
        for from in SagaStatus::ALL.into_iter().filter(SagaStatus::is_terminal) {
            for to in SagaStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn test_transition_error() {
        let err = SagaStatus::Completed
            .transition_to(SagaStatus::Running)
            .unwrap_err();
        assert_eq!(err.from, SagaStatus::Completed);
        assert_eq!(err.to, SagaStatus::Running);
        assert_eq!(
            err.to_string(),
            "Invalid saga status transition: Completed -> Running"
        );
    }

    #[test]
    fn test_cancel_and_retry_guards() {
        assert!(SagaStatus::Running.can_cancel());
        assert!(!SagaStatus::Completed.can_cancel());
        assert!(!SagaStatus::Compensated.can_cancel());
        assert!(!SagaStatus::Completed.can_retry());
        assert!(SagaStatus::Failed.can_retry());
        assert!(SagaStatus::Compensated.can_retry());
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            "compensated".parse::<SagaStatus>().unwrap(),
            SagaStatus::Compensated
        );
        assert_eq!("Failed".parse::<SagaStatus>().unwrap(), SagaStatus::Failed);
        assert!(matches!(
            "Exploded".parse::<SagaStatus>(),
            Err(StoreError::UnknownStatus(_))
        ));
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&SagaStatus::Compensating).unwrap();
        assert_eq!(json, "\"Compensating\"");
        let deserialized: SagaStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, SagaStatus::Compensating);
    }
}
