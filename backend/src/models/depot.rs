//! Depot entities: trains, workers, activity records and their reference data.

use chrono::{NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::interval::{HasInterval, Interval, Timestamp};
use crate::define_id_type;

define_id_type!(i64, TrainId);
define_id_type!(i32, UniformId);
define_id_type!(i32, ActivityKindId);
define_id_type!(i64, WorkerId);
define_id_type!(i64, ActivityRecordId);
define_id_type!(i64, SnapshotId);
define_id_type!(i32, MeanDurationId);
define_id_type!(i64, IncidentId);

impl TrainId {
    /// Reserved train meaning "no vehicle".
    pub const UNASSIGNED: TrainId = TrainId(0);
}

/// A train standing in the depot between arrival and departure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Train {
    pub id: TrainId,
    pub number: String,
    pub stay: Interval,
}

impl Train {
    pub const UNASSIGNED_NUMBER: &'static str = "000-000";

    /// The reserved placeholder train every store starts with.
    pub fn unassigned() -> Self {
        let epoch = NaiveDate::from_ymd_opt(1, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| Utc.from_utc_datetime(&naive))
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        Self {
            id: TrainId::UNASSIGNED,
            number: Self::UNASSIGNED_NUMBER.to_string(),
            stay: Interval::Bounded {
                start: epoch,
                end: epoch,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTrain {
    pub number: String,
    pub stay: Interval,
}

/// Uniform colour, the equipment class a worker is recognised by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uniform {
    pub id: UniformId,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityKind {
    pub id: ActivityKindId,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub train_id: TrainId,
    pub uniform_id: UniformId,
    pub helmet_on: bool,
    pub presence: Interval,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorker {
    pub train_id: TrainId,
    pub uniform_id: UniformId,
    pub helmet_on: bool,
    pub presence: Interval,
}

/// One stretch of a worker doing a given kind of activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: ActivityRecordId,
    pub worker_id: WorkerId,
    pub activity_kind_id: ActivityKindId,
    pub span: Interval,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewActivityRecord {
    pub worker_id: WorkerId,
    pub activity_kind_id: ActivityKindId,
    pub span: Interval,
}

/// Point-in-time head count of workers seen around a train.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub id: SnapshotId,
    pub timestamp: Timestamp,
    pub worker_count: i32,
    pub train_id: TrainId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFrameSnapshot {
    pub timestamp: Timestamp,
    pub worker_count: i32,
    pub train_id: TrainId,
}

/// Materialized mean duration of the active activity for one uniform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanDuration {
    pub id: MeanDurationId,
    pub uniform_id: UniformId,
    pub mean_seconds: f64,
    pub worker_count: i64,
    pub activity_count: i64,
    pub last_updated: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub worker_id: WorkerId,
    pub incident_type: String,
    pub message: String,
    pub occurred_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIncident {
    pub worker_id: WorkerId,
    pub incident_type: String,
    pub message: String,
    pub occurred_at: Timestamp,
}

/// Number of workers attached to one train.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainWorkerCount {
    pub train_id: TrainId,
    pub train_number: String,
    pub worker_count: i64,
}

/// Worker totals used for the helmet usage percentage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyCounts {
    pub total: i64,
    pub flagged: i64,
}

/// Live row counts of the two retention-bounded tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    pub workers: usize,
    pub activities: usize,
}

/// Rows removed by a cascading delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeSummary {
    pub workers: usize,
    pub activities: usize,
    pub incidents: usize,
    pub snapshots: usize,
}

impl HasInterval for Train {
    fn interval(&self) -> Interval {
        self.stay
    }

    fn record_id(&self) -> i64 {
        self.id.value()
    }
}

impl HasInterval for Worker {
    fn interval(&self) -> Interval {
        self.presence
    }

    fn record_id(&self) -> i64 {
        self.id.value()
    }
}

impl HasInterval for ActivityRecord {
    fn interval(&self) -> Interval {
        self.span
    }

    fn record_id(&self) -> i64 {
        self.id.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unassigned_train() {
        let train = Train::unassigned();
        assert_eq!(train.id, TrainId::UNASSIGNED);
        assert_eq!(train.number, "000-000");
        assert!(!train.stay.is_open());
    }

    #[test]
    fn test_id_conversions() {
        let id = WorkerId::from(42);
        assert_eq!(id.value(), 42);
        assert_eq!(i64::from(id), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_id_serializes_transparently() {
        let json = serde_json::to_string(&UniformId::new(3)).unwrap();
        assert_eq!(json, "3");
    }
}
