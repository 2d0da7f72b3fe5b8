use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{SagaInstance, SagaStatus};

/// Filter for listing saga instances.
///
/// Results are ordered by creation time, oldest first.
#[derive(Debug, Clone, Default)]
pub struct SagaQuery {
    /// Filter by status.
    pub status: Option<SagaStatus>,

    /// Filter by saga type.
    pub saga_type: Option<String>,

    /// Filter by instances created at or after this timestamp.
    pub created_after: Option<DateTime<Utc>>,

    /// Filter by instances created at or before this timestamp.
    pub created_before: Option<DateTime<Utc>>,

    /// Maximum number of instances to return.
    pub limit: Option<usize>,

    /// Number of instances to skip.
    pub offset: Option<usize>,
}

impl SagaQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for instances in a specific status.
    pub fn for_status(status: SagaStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Filters by status.
    pub fn status(mut self, status: SagaStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filters by saga type.
    pub fn saga_type(mut self, saga_type: impl Into<String>) -> Self {
        self.saga_type = Some(saga_type.into());
        self
    }

    /// Filters to instances created at or after this timestamp.
    pub fn created_after(mut self, timestamp: DateTime<Utc>) -> Self {
        self.created_after = Some(timestamp);
        self
    }

    /// Filters to instances created at or before this timestamp.
    pub fn created_before(mut self, timestamp: DateTime<Utc>) -> Self {
        self.created_before = Some(timestamp);
        self
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips a number of results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the instance passes every filter of this query.
    ///
    /// Paging (`limit`/`offset`) is not considered.
    pub fn matches(&self, instance: &SagaInstance) -> bool {
        if let Some(status) = self.status
            && instance.status() != status
        {
            return false;
        }
        if let Some(ref saga_type) = self.saga_type
            && instance.saga_type() != saga_type
        {
            return false;
        }
        if let Some(after) = self.created_after
            && instance.created_at() < after
        {
            return false;
        }
        if let Some(before) = self.created_before
            && instance.created_at() > before
        {
            return false;
        }
        true
    }
}

/// Count of saga instances per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaStatistics {
    pub total: u64,
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub compensating: u64,
    pub compensated: u64,
    pub cancelled: u64,
    pub failed: u64,
}

impl SagaStatistics {
    /// Adds `count` instances in `status`.
    pub fn add(&mut self, status: SagaStatus, count: u64) {
        self.total += count;
        let slot = match status {
            SagaStatus::Pending => &mut self.pending,
            SagaStatus::Running => &mut self.running,
            SagaStatus::Completed => &mut self.completed,
            SagaStatus::Compensating => &mut self.compensating,
            SagaStatus::Compensated => &mut self.compensated,
            SagaStatus::Cancelled => &mut self.cancelled,
            SagaStatus::Failed => &mut self.failed,
        };
        *slot += count;
    }

    /// Returns the count for a single status.
    pub fn count(&self, status: SagaStatus) -> u64 {
        match status {
            SagaStatus::Pending => self.pending,
            SagaStatus::Running => self.running,
            SagaStatus::Completed => self.completed,
            SagaStatus::Compensating => self.compensating,
            SagaStatus::Compensated => self.compensated,
            SagaStatus::Cancelled => self.cancelled,
            SagaStatus::Failed => self.failed,
        }
    }

    /// Share of finished sagas that completed, in `[0, 1]`.
    ///
    /// Returns `None` while no saga has reached a terminal status.
    pub fn success_rate(&self) -> Option<f64> {
        let finished = self.completed + self.compensated + self.cancelled + self.failed;
        (finished > 0).then(|| self.completed as f64 / finished as f64)
    }
}

impl FromIterator<SagaStatus> for SagaStatistics {
    fn from_iter<I: IntoIterator<Item = SagaStatus>>(iter: I) -> Self {
        let mut stats = SagaStatistics::default();
        for status in iter {
            stats.add(status, 1);
        }
        stats
    }
}
