use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::schema::{
    activities, alerts, frame_statistics, mean_working_times, trains, uniforms,
    worker_activities, workers,
};
use crate::db::repository::{RepositoryError, RepositoryResult};
use crate::models::{
    ActivityKind, ActivityKindId, ActivityRecord, ActivityRecordId, FrameSnapshot, Incident,
    IncidentId, Interval, MeanDuration, MeanDurationId, SnapshotId, Train, TrainId, Uniform,
    UniformId, Worker, WorkerId,
};

/// Stored rows are checked on the way in, so a bad interval here means the
/// table was edited behind our back.
fn stored_interval(
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    table: &str,
    id: i64,
) -> RepositoryResult<Interval> {
    Interval::new(start, end).map_err(|e| {
        RepositoryError::internal(format!("Corrupt interval in {} row {}: {}", table, id, e))
    })
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = trains)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TrainRow {
    pub id: i64,
    pub train_number: String,
    pub arrival_time: DateTime<Utc>,
    pub departure_time: Option<DateTime<Utc>>,
}

impl TryFrom<TrainRow> for Train {
    type Error = RepositoryError;

    fn try_from(row: TrainRow) -> RepositoryResult<Self> {
        Ok(Train {
            id: TrainId(row.id),
            stay: stored_interval(row.arrival_time, row.departure_time, "trains", row.id)?,
            number: row.train_number,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = trains)]
pub struct NewTrainRow {
    pub train_number: String,
    pub arrival_time: DateTime<Utc>,
    pub departure_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = uniforms)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UniformRow {
    pub id: i32,
    pub color: String,
}

impl From<UniformRow> for Uniform {
    fn from(row: UniformRow) -> Self {
        Uniform {
            id: UniformId(row.id),
            label: row.color,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = activities)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ActivityKindRow {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
}

impl From<ActivityKindRow> for ActivityKind {
    fn from(row: ActivityKindRow) -> Self {
        ActivityKind {
            id: ActivityKindId(row.id),
            name: row.name,
            description: row.description,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = workers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WorkerRow {
    pub id: i64,
    pub train_id: i64,
    pub uniform_id: i32,
    pub helmet_on: bool,
    pub appearance_time: DateTime<Utc>,
    pub disappearance_time: Option<DateTime<Utc>>,
}

impl TryFrom<WorkerRow> for Worker {
    type Error = RepositoryError;

    fn try_from(row: WorkerRow) -> RepositoryResult<Self> {
        Ok(Worker {
            id: WorkerId(row.id),
            train_id: TrainId(row.train_id),
            uniform_id: UniformId(row.uniform_id),
            helmet_on: row.helmet_on,
            presence: stored_interval(
                row.appearance_time,
                row.disappearance_time,
                "workers",
                row.id,
            )?,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = workers)]
pub struct NewWorkerRow {
    pub train_id: i64,
    pub uniform_id: i32,
    pub helmet_on: bool,
    pub appearance_time: DateTime<Utc>,
    pub disappearance_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = worker_activities)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WorkerActivityRow {
    pub id: i64,
    pub worker_id: i64,
    pub activity_id: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl TryFrom<WorkerActivityRow> for ActivityRecord {
    type Error = RepositoryError;

    fn try_from(row: WorkerActivityRow) -> RepositoryResult<Self> {
        Ok(ActivityRecord {
            id: ActivityRecordId(row.id),
            worker_id: WorkerId(row.worker_id),
            activity_kind_id: ActivityKindId(row.activity_id),
            span: stored_interval(row.start_time, row.end_time, "worker_activities", row.id)?,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = worker_activities)]
pub struct NewWorkerActivityRow {
    pub worker_id: i64,
    pub activity_id: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = frame_statistics)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FrameStatisticsRow {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub workers_count: i32,
    pub train_id: i64,
}

impl From<FrameStatisticsRow> for FrameSnapshot {
    fn from(row: FrameStatisticsRow) -> Self {
        FrameSnapshot {
            id: SnapshotId(row.id),
            timestamp: row.timestamp,
            worker_count: row.workers_count,
            train_id: TrainId(row.train_id),
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = frame_statistics)]
pub struct NewFrameStatisticsRow {
    pub timestamp: DateTime<Utc>,
    pub workers_count: i32,
    pub train_id: i64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = mean_working_times)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MeanWorkingTimeRow {
    pub id: i32,
    pub uniform_id: i32,
    pub mean_seconds: f64,
    pub worker_count: i64,
    pub activity_count: i64,
    pub last_updated: DateTime<Utc>,
}

impl From<MeanWorkingTimeRow> for MeanDuration {
    fn from(row: MeanWorkingTimeRow) -> Self {
        MeanDuration {
            id: MeanDurationId(row.id),
            uniform_id: UniformId(row.uniform_id),
            mean_seconds: row.mean_seconds,
            worker_count: row.worker_count,
            activity_count: row.activity_count,
            last_updated: row.last_updated,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = mean_working_times)]
pub struct NewMeanWorkingTimeRow {
    pub uniform_id: i32,
    pub mean_seconds: f64,
    pub worker_count: i64,
    pub activity_count: i64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = alerts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AlertRow {
    pub id: i64,
    pub worker_id: i64,
    pub alert_type: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl From<AlertRow> for Incident {
    fn from(row: AlertRow) -> Self {
        Incident {
            id: IncidentId(row.id),
            worker_id: WorkerId(row.worker_id),
            incident_type: row.alert_type,
            message: row.message,
            occurred_at: row.occurred_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = alerts)]
pub struct NewAlertRow {
    pub worker_id: i64,
    pub alert_type: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Convert a batch of rows, failing on the first bad one.
pub fn convert_all<R, T>(rows: Vec<R>) -> RepositoryResult<Vec<T>>
where
    T: TryFrom<R, Error = RepositoryError>,
{
    rows.into_iter().map(T::try_from).collect()
}
