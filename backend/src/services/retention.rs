//! Bounded-size retention for workers and activity records.
//!
//! Once either table reaches `max_records` rows, one cycle evicts the
//! `delete_batch` oldest activity records (by start) and then the
//! `delete_batch` oldest workers (by appearance). "Oldest" is FIFO by time,
//! never by access. Activity records go first so the dependent table is
//! trimmed explicitly instead of only through the worker cascade.

use serde::{Deserialize, Serialize};

use crate::models::{
    ActivityRecord, ActivityRecordId, HasInterval, RecordCounts, Worker, WorkerId,
};

/// Rejected retention thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RetentionError {
    #[error("retention.max_records must be at least 1")]
    ZeroMaxRecords,

    #[error("retention.delete_batch must be at least 1")]
    ZeroDeleteBatch,
}

pub const DEFAULT_MAX_RECORDS: usize = 7;
pub const DEFAULT_DELETE_BATCH: usize = 4;

/// Thresholds of the retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    #[serde(default = "default_delete_batch")]
    pub delete_batch: usize,
}

fn default_max_records() -> usize {
    DEFAULT_MAX_RECORDS
}

fn default_delete_batch() -> usize {
    DEFAULT_DELETE_BATCH
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
            delete_batch: DEFAULT_DELETE_BATCH,
        }
    }
}

impl RetentionPolicy {
    pub fn new(max_records: usize, delete_batch: usize) -> Result<Self, RetentionError> {
        let policy = Self {
            max_records,
            delete_batch,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), RetentionError> {
        if self.max_records == 0 {
            return Err(RetentionError::ZeroMaxRecords);
        }
        if self.delete_batch == 0 {
            return Err(RetentionError::ZeroDeleteBatch);
        }
        Ok(())
    }

    /// Whether a cycle with these live counts has to evict.
    pub fn is_triggered(&self, counts: RecordCounts) -> bool {
        counts.workers >= self.max_records || counts.activities >= self.max_records
    }
}

/// The `batch` earliest-starting items, ties broken by id.
pub fn select_oldest<T: HasInterval>(items: &[T], batch: usize) -> Vec<&T> {
    let mut ordered: Vec<&T> = items.iter().collect();
    ordered.sort_by_key(|item| (item.interval().start(), item.record_id()));
    ordered.truncate(batch);
    ordered
}

/// Rows one cycle will evict explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionPlan {
    pub activities: Vec<ActivityRecordId>,
    pub workers: Vec<WorkerId>,
}

impl EvictionPlan {
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty() && self.workers.is_empty()
    }
}

/// Decide what a cycle evicts given the full contents of both tables.
///
/// Returns an empty plan when the policy is not triggered.
pub fn plan_eviction(
    policy: &RetentionPolicy,
    workers: &[Worker],
    activities: &[ActivityRecord],
) -> EvictionPlan {
    let counts = RecordCounts {
        workers: workers.len(),
        activities: activities.len(),
    };
    if !policy.is_triggered(counts) {
        return EvictionPlan::default();
    }

    EvictionPlan {
        activities: select_oldest(activities, policy.delete_batch)
            .into_iter()
            .map(|a| a.id)
            .collect(),
        workers: select_oldest(workers, policy.delete_batch)
            .into_iter()
            .map(|w| w.id)
            .collect(),
    }
}

/// Outcome of one retention cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionReport {
    pub triggered: bool,
    pub counts_before: RecordCounts,
    pub counts_after: RecordCounts,
    pub evicted_activities: Vec<ActivityRecordId>,
    pub evicted_workers: Vec<WorkerId>,
    /// Activity records removed because their worker was evicted.
    pub cascaded_activities: usize,
    /// Incidents removed because their worker was evicted.
    pub cascaded_incidents: usize,
}

impl RetentionReport {
    /// Report for a cycle below the threshold.
    pub fn untouched(counts: RecordCounts) -> Self {
        Self {
            triggered: false,
            counts_before: counts,
            counts_after: counts,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityKindId, Interval, Timestamp, TrainId, UniformId};
    use chrono::{TimeZone, Utc};

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn worker(id: i64, start: i64) -> Worker {
        Worker {
            id: WorkerId(id),
            train_id: TrainId(1),
            uniform_id: UniformId(1),
            helmet_on: true,
            presence: Interval::open(t(start)),
        }
    }

    fn activity(id: i64, start: i64) -> ActivityRecord {
        ActivityRecord {
            id: ActivityRecordId(id),
            worker_id: WorkerId(1),
            activity_kind_id: ActivityKindId(1),
            span: Interval::open(t(start)),
        }
    }

    #[test]
    fn test_policy_validation() {
        assert_eq!(RetentionPolicy::new(0, 1), Err(RetentionError::ZeroMaxRecords));
        assert_eq!(RetentionPolicy::new(1, 0), Err(RetentionError::ZeroDeleteBatch));
        assert!(RetentionPolicy::new(7, 4).is_ok());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let policy = RetentionPolicy::new(7, 4).unwrap();
        assert!(!policy.is_triggered(RecordCounts {
            workers: 6,
            activities: 6
        }));
        assert!(policy.is_triggered(RecordCounts {
            workers: 7,
            activities: 0
        }));
        assert!(policy.is_triggered(RecordCounts {
            workers: 0,
            activities: 7
        }));
    }

    #[test]
    fn test_select_oldest_orders_by_start_then_id() {
        let items = vec![activity(5, 30), activity(2, 10), activity(1, 10), activity(9, 0)];
        let ids: Vec<i64> = select_oldest(&items, 3)
            .iter()
            .map(|a| a.id.value())
            .collect();
        assert_eq!(ids, vec![9, 1, 2]);
    }

    #[test]
    fn test_plan_below_threshold_is_empty() {
        let policy = RetentionPolicy::default();
        let plan = plan_eviction(&policy, &[worker(1, 0)], &[activity(1, 0)]);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_plan_evicts_batch_from_both_tables() {
        let policy = RetentionPolicy::new(7, 4).unwrap();
        let activities: Vec<ActivityRecord> = (1..=8).map(|i| activity(i, i * 10)).collect();
        let workers: Vec<Worker> = (1..=3).map(|i| worker(i, 100 - i)).collect();

        let plan = plan_eviction(&policy, &workers, &activities);
        assert_eq!(
            plan.activities,
            vec![
                ActivityRecordId(1),
                ActivityRecordId(2),
                ActivityRecordId(3),
                ActivityRecordId(4)
            ]
        );
        assert_eq!(plan.workers, vec![WorkerId(3), WorkerId(2), WorkerId(1)]);
    }
}
