//! Core depot repository trait: interval records and their reference data.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{
    ActivityKind, ActivityKindId, ActivityRecord, ActivityRecordId, CascadeSummary,
    FrameSnapshot, Incident, NewActivityRecord, NewFrameSnapshot, NewIncident, NewTrain,
    NewWorker, SafetyCounts, TimeWindow, Timestamp, Train, TrainId, TrainWorkerCount, Uniform,
    Worker, WorkerId,
};

/// Repository trait for the depot's interval store.
///
/// Window reads (`*_in_window`) return every record whose interval overlaps
/// the closed window, treating a missing end as still ongoing. Writes
/// validate foreign keys and report a missing parent as `NotFound`.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait DepotRepository: Send + Sync {
    // ==================== Health & Connection ====================

    /// Check if the store is reachable.
    ///
    /// # Returns
    /// - `Ok(true)` if the store is healthy
    /// - `Ok(false)` if it is unhealthy but no error occurred
    /// - `Err(RepositoryError)` if the check itself failed
    async fn health_check(&self) -> RepositoryResult<bool>;

    // ==================== Trains ====================

    async fn insert_train(&self, train: &NewTrain) -> RepositoryResult<Train>;

    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If the train doesn't exist
    async fn get_train(&self, train_id: TrainId) -> RepositoryResult<Train>;

    /// All trains carrying `number`, ordered by id.
    async fn find_trains_by_number(&self, number: &str) -> RepositoryResult<Vec<Train>>;

    /// Record the departure of a train still in the depot.
    async fn close_train(&self, train_id: TrainId, departed_at: Timestamp)
        -> RepositoryResult<Train>;

    /// Delete a train together with its workers and everything they own.
    async fn delete_train(&self, train_id: TrainId) -> RepositoryResult<CascadeSummary>;

    async fn trains_in_window(&self, window: &TimeWindow) -> RepositoryResult<Vec<Train>>;

    // ==================== Reference Data ====================

    /// # Returns
    /// * `Err(RepositoryError::ConstraintViolation)` - If the label is taken
    async fn insert_uniform(&self, label: &str) -> RepositoryResult<Uniform>;

    async fn list_uniforms(&self) -> RepositoryResult<Vec<Uniform>>;

    /// # Returns
    /// * `Err(RepositoryError::ConstraintViolation)` - If the name is taken
    async fn insert_activity_kind(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> RepositoryResult<ActivityKind>;

    /// Look up an activity kind by its exact name.
    async fn find_activity_kind(&self, name: &str) -> RepositoryResult<Option<ActivityKind>>;

    async fn list_activity_kinds(&self) -> RepositoryResult<Vec<ActivityKind>>;

    // ==================== Workers ====================

    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If the train or uniform doesn't exist
    async fn insert_worker(&self, worker: &NewWorker) -> RepositoryResult<Worker>;

    async fn get_worker(&self, worker_id: WorkerId) -> RepositoryResult<Worker>;

    /// Record the moment a worker was last seen.
    async fn close_worker(&self, worker_id: WorkerId, left_at: Timestamp)
        -> RepositoryResult<Worker>;

    /// All workers, ordered by id.
    async fn list_workers(&self) -> RepositoryResult<Vec<Worker>>;

    async fn workers_for_train(&self, train_id: TrainId) -> RepositoryResult<Vec<Worker>>;

    async fn workers_in_window(&self, window: &TimeWindow) -> RepositoryResult<Vec<Worker>>;

    /// Delete a worker together with its activity records and incidents.
    async fn delete_worker(&self, worker_id: WorkerId) -> RepositoryResult<CascadeSummary>;

    // ==================== Activity Records ====================

    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If the worker or activity kind doesn't exist
    async fn insert_activity(&self, record: &NewActivityRecord)
        -> RepositoryResult<ActivityRecord>;

    async fn close_activity(
        &self,
        record_id: ActivityRecordId,
        ended_at: Timestamp,
    ) -> RepositoryResult<ActivityRecord>;

    async fn activities_for_worker(
        &self,
        worker_id: WorkerId,
    ) -> RepositoryResult<Vec<ActivityRecord>>;

    async fn activities_of_kind(
        &self,
        kind_id: ActivityKindId,
    ) -> RepositoryResult<Vec<ActivityRecord>>;

    async fn activities_in_window(
        &self,
        window: &TimeWindow,
    ) -> RepositoryResult<Vec<ActivityRecord>>;

    // ==================== Snapshots ====================

    async fn insert_snapshot(&self, snapshot: &NewFrameSnapshot)
        -> RepositoryResult<FrameSnapshot>;

    /// Snapshots taken inside the window, ordered by timestamp then id.
    async fn snapshots_in_window(&self, window: &TimeWindow)
        -> RepositoryResult<Vec<FrameSnapshot>>;

    // ==================== Incidents ====================

    async fn insert_incident(&self, incident: &NewIncident) -> RepositoryResult<Incident>;

    /// Incidents at or after `since`, optionally restricted to one type.
    async fn incidents_since(
        &self,
        since: Timestamp,
        incident_type: Option<&str>,
    ) -> RepositoryResult<Vec<Incident>>;

    // ==================== Counts ====================

    /// Worker count per train that has at least one worker, ordered by train id.
    async fn worker_counts_by_train(&self) -> RepositoryResult<Vec<TrainWorkerCount>>;

    /// Total workers and workers with the helmet flag set.
    async fn safety_counts(&self) -> RepositoryResult<SafetyCounts>;
}
