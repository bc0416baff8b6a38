//! In-memory local repository implementation.
//!
//! This module provides a local implementation of all repository traits
//! suitable for unit testing and local development. All data is stored in
//! ordered maps behind a single lock, providing fast, deterministic, and
//! isolated execution.
//!
//! Multi-step writes (cascading deletes, retention cycles, mean-duration
//! recomputes) hold the write lock for the whole step and work on a staged
//! copy of the tables that replaces the live one only when every step
//! succeeded.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::db::repository::*;
use crate::models::*;
use crate::services::aggregation::compute_mean_durations;
use crate::services::overlap::filter_overlapping;
use crate::services::retention::{plan_eviction, RetentionPolicy, RetentionReport};

/// In-memory local repository.
///
/// # Example
/// ```
/// use depot_analytics::db::repositories::LocalRepository;
/// use depot_analytics::db::DepotRepository;
///
/// # tokio_test_block(async {
/// let repo = LocalRepository::new();
/// let uniform = repo.insert_uniform("orange").await.unwrap();
/// assert_eq!(repo.list_uniforms().await.unwrap(), vec![uniform]);
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

struct LocalData {
    tables: Tables,

    // Connection health
    is_healthy: bool,

    // Remaining deletes before a simulated store failure
    delete_budget: Option<usize>,
}

#[derive(Clone)]
struct Tables {
    trains: BTreeMap<TrainId, Train>,
    uniforms: BTreeMap<UniformId, Uniform>,
    activity_kinds: BTreeMap<ActivityKindId, ActivityKind>,
    workers: BTreeMap<WorkerId, Worker>,
    activities: BTreeMap<ActivityRecordId, ActivityRecord>,
    snapshots: BTreeMap<SnapshotId, FrameSnapshot>,
    mean_durations: BTreeMap<UniformId, MeanDuration>,
    incidents: BTreeMap<IncidentId, Incident>,

    // ID counters
    next_train_id: i64,
    next_uniform_id: i32,
    next_kind_id: i32,
    next_worker_id: i64,
    next_activity_id: i64,
    next_snapshot_id: i64,
    next_mean_duration_id: i32,
    next_incident_id: i64,
}

impl Default for Tables {
    fn default() -> Self {
        let reserved = Train::unassigned();
        let mut trains = BTreeMap::new();
        trains.insert(reserved.id, reserved);

        Self {
            trains,
            uniforms: BTreeMap::new(),
            activity_kinds: BTreeMap::new(),
            workers: BTreeMap::new(),
            activities: BTreeMap::new(),
            snapshots: BTreeMap::new(),
            mean_durations: BTreeMap::new(),
            incidents: BTreeMap::new(),
            next_train_id: 1,
            next_uniform_id: 1,
            next_kind_id: 1,
            next_worker_id: 1,
            next_activity_id: 1,
            next_snapshot_id: 1,
            next_mean_duration_id: 1,
            next_incident_id: 1,
        }
    }
}

/// Revalidate an interval built outside the checked constructors and
/// truncate it to whole seconds.
fn normalize(interval: Interval) -> RepositoryResult<Interval> {
    Ok(Interval::new(
        to_seconds(interval.start()),
        interval.end().map(to_seconds),
    )?)
}

fn not_found(entity: &str, id: impl ToString, operation: &str) -> RepositoryError {
    let id = id.to_string();
    RepositoryError::not_found_with_context(
        format!("{} {} not found", entity, id),
        ErrorContext::new(operation)
            .with_entity(entity)
            .with_entity_id(id),
    )
}

impl Tables {
    fn record_counts(&self) -> RecordCounts {
        RecordCounts {
            workers: self.workers.len(),
            activities: self.activities.len(),
        }
    }

    /// Delete one worker and everything it owns.
    fn remove_worker(
        &mut self,
        worker_id: WorkerId,
        budget: &mut Option<usize>,
    ) -> RepositoryResult<CascadeSummary> {
        spend_delete(budget, "delete_worker")?;
        if self.workers.remove(&worker_id).is_none() {
            return Err(not_found("worker", worker_id, "delete_worker"));
        }

        let activities_before = self.activities.len();
        self.activities.retain(|_, a| a.worker_id != worker_id);
        let incidents_before = self.incidents.len();
        self.incidents.retain(|_, i| i.worker_id != worker_id);

        Ok(CascadeSummary {
            workers: 1,
            activities: activities_before - self.activities.len(),
            incidents: incidents_before - self.incidents.len(),
            snapshots: 0,
        })
    }
}

/// Consume one unit of the simulated delete budget.
fn spend_delete(budget: &mut Option<usize>, operation: &str) -> RepositoryResult<()> {
    match budget {
        Some(0) => Err(RepositoryError::unavailable_with_context(
            "Simulated store failure during delete",
            ErrorContext::new(operation),
        )),
        Some(remaining) => {
            *remaining -= 1;
            Ok(())
        }
        None => Ok(()),
    }
}

impl LocalRepository {
    /// Create a new repository holding only the reserved train.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData {
                tables: Tables::default(),
                is_healthy: true,
                delete_budget: None,
            })),
        }
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Let `deletes` more row deletions succeed, then fail every following
    /// one with `StoreUnavailable`. `None` removes the limit.
    pub fn fail_deletes_after(&self, deletes: Option<usize>) {
        self.data.write().delete_budget = deletes;
    }

    /// Helper to check health and return error if unhealthy.
    fn check_health(&self) -> RepositoryResult<()> {
        if !self.data.read().is_healthy {
            return Err(RepositoryError::unavailable("Store is not healthy"));
        }
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> RepositoryResult<T> {
        self.check_health()?;
        Ok(f(&self.data.read().tables))
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> RepositoryResult<T>,
    ) -> RepositoryResult<T> {
        self.check_health()?;
        f(&mut self.data.write().tables)
    }

    /// Run `f` against a staged copy of the tables and commit it only if
    /// `f` succeeds.
    fn write_atomically<T>(
        &self,
        f: impl FnOnce(&mut Tables, &mut Option<usize>) -> RepositoryResult<T>,
    ) -> RepositoryResult<T> {
        let mut data = self.data.write();
        if !data.is_healthy {
            return Err(RepositoryError::unavailable("Store is not healthy"));
        }

        let mut staged = data.tables.clone();
        let mut budget = data.delete_budget;
        let result = f(&mut staged, &mut budget)?;

        data.tables = staged;
        data.delete_budget = budget;
        Ok(result)
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DepotRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }

    // ==================== Trains ====================

    async fn insert_train(&self, train: &NewTrain) -> RepositoryResult<Train> {
        let stay = normalize(train.stay)?;
        self.write(|t| {
            let id = TrainId(t.next_train_id);
            t.next_train_id += 1;
            let stored = Train {
                id,
                number: train.number.clone(),
                stay,
            };
            t.trains.insert(id, stored.clone());
            Ok(stored)
        })
    }

    async fn get_train(&self, train_id: TrainId) -> RepositoryResult<Train> {
        self.read(|t| t.trains.get(&train_id).cloned())?
            .ok_or_else(|| not_found("train", train_id, "get_train"))
    }

    async fn find_trains_by_number(&self, number: &str) -> RepositoryResult<Vec<Train>> {
        self.read(|t| {
            t.trains
                .values()
                .filter(|train| train.number == number)
                .cloned()
                .collect()
        })
    }

    async fn close_train(
        &self,
        train_id: TrainId,
        departed_at: Timestamp,
    ) -> RepositoryResult<Train> {
        self.write(|t| {
            let train = t
                .trains
                .get_mut(&train_id)
                .ok_or_else(|| not_found("train", train_id, "close_train"))?;
            train.stay = train.stay.close(to_seconds(departed_at))?;
            Ok(train.clone())
        })
    }

    async fn delete_train(&self, train_id: TrainId) -> RepositoryResult<CascadeSummary> {
        if train_id == TrainId::UNASSIGNED {
            return Err(RepositoryError::validation_with_context(
                "The reserved train cannot be deleted",
                ErrorContext::new("delete_train")
                    .with_entity("train")
                    .with_entity_id(train_id),
            ));
        }

        let summary = self.write_atomically(|t, budget| {
            spend_delete(budget, "delete_train")?;
            if t.trains.remove(&train_id).is_none() {
                return Err(not_found("train", train_id, "delete_train"));
            }

            let mut summary = CascadeSummary::default();
            let owned: Vec<WorkerId> = t
                .workers
                .values()
                .filter(|w| w.train_id == train_id)
                .map(|w| w.id)
                .collect();
            for worker_id in owned {
                let removed = t.remove_worker(worker_id, budget)?;
                summary.workers += removed.workers;
                summary.activities += removed.activities;
                summary.incidents += removed.incidents;
            }

            let snapshots_before = t.snapshots.len();
            t.snapshots.retain(|_, s| s.train_id != train_id);
            summary.snapshots = snapshots_before - t.snapshots.len();
            Ok(summary)
        })?;

        info!("Deleted train {} ({:?})", train_id, summary);
        Ok(summary)
    }

    async fn trains_in_window(&self, window: &TimeWindow) -> RepositoryResult<Vec<Train>> {
        self.read(|t| filter_overlapping(t.trains.values().cloned(), window))
    }

    // ==================== Reference Data ====================

    async fn insert_uniform(&self, label: &str) -> RepositoryResult<Uniform> {
        self.write(|t| {
            if t.uniforms.values().any(|u| u.label == label) {
                return Err(RepositoryError::constraint_with_context(
                    format!("Uniform label '{}' already exists", label),
                    ErrorContext::new("insert_uniform").with_entity("uniform"),
                ));
            }
            let id = UniformId(t.next_uniform_id);
            t.next_uniform_id += 1;
            let uniform = Uniform {
                id,
                label: label.to_string(),
            };
            t.uniforms.insert(id, uniform.clone());
            Ok(uniform)
        })
    }

    async fn list_uniforms(&self) -> RepositoryResult<Vec<Uniform>> {
        self.read(|t| t.uniforms.values().cloned().collect())
    }

    async fn insert_activity_kind(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> RepositoryResult<ActivityKind> {
        self.write(|t| {
            if t.activity_kinds.values().any(|k| k.name == name) {
                return Err(RepositoryError::constraint_with_context(
                    format!("Activity kind '{}' already exists", name),
                    ErrorContext::new("insert_activity_kind").with_entity("activity_kind"),
                ));
            }
            let id = ActivityKindId(t.next_kind_id);
            t.next_kind_id += 1;
            let kind = ActivityKind {
                id,
                name: name.to_string(),
                description: description.map(str::to_string),
            };
            t.activity_kinds.insert(id, kind.clone());
            Ok(kind)
        })
    }

    async fn find_activity_kind(&self, name: &str) -> RepositoryResult<Option<ActivityKind>> {
        self.read(|t| t.activity_kinds.values().find(|k| k.name == name).cloned())
    }

    async fn list_activity_kinds(&self) -> RepositoryResult<Vec<ActivityKind>> {
        self.read(|t| t.activity_kinds.values().cloned().collect())
    }

    // ==================== Workers ====================

    async fn insert_worker(&self, worker: &NewWorker) -> RepositoryResult<Worker> {
        let presence = normalize(worker.presence)?;
        self.write(|t| {
            if !t.trains.contains_key(&worker.train_id) {
                return Err(not_found("train", worker.train_id, "insert_worker"));
            }
            if !t.uniforms.contains_key(&worker.uniform_id) {
                return Err(not_found("uniform", worker.uniform_id, "insert_worker"));
            }
            let id = WorkerId(t.next_worker_id);
            t.next_worker_id += 1;
            let stored = Worker {
                id,
                train_id: worker.train_id,
                uniform_id: worker.uniform_id,
                helmet_on: worker.helmet_on,
                presence,
            };
            t.workers.insert(id, stored.clone());
            Ok(stored)
        })
    }

    async fn get_worker(&self, worker_id: WorkerId) -> RepositoryResult<Worker> {
        self.read(|t| t.workers.get(&worker_id).cloned())?
            .ok_or_else(|| not_found("worker", worker_id, "get_worker"))
    }

    async fn close_worker(&self, worker_id: WorkerId, left_at: Timestamp) -> RepositoryResult<Worker> {
        self.write(|t| {
            let worker = t
                .workers
                .get_mut(&worker_id)
                .ok_or_else(|| not_found("worker", worker_id, "close_worker"))?;
            worker.presence = worker.presence.close(to_seconds(left_at))?;
            Ok(worker.clone())
        })
    }

    async fn list_workers(&self) -> RepositoryResult<Vec<Worker>> {
        self.read(|t| t.workers.values().cloned().collect())
    }

    async fn workers_for_train(&self, train_id: TrainId) -> RepositoryResult<Vec<Worker>> {
        self.read(|t| {
            t.workers
                .values()
                .filter(|w| w.train_id == train_id)
                .cloned()
                .collect()
        })
    }

    async fn workers_in_window(&self, window: &TimeWindow) -> RepositoryResult<Vec<Worker>> {
        self.read(|t| filter_overlapping(t.workers.values().cloned(), window))
    }

    async fn delete_worker(&self, worker_id: WorkerId) -> RepositoryResult<CascadeSummary> {
        let summary = self.write_atomically(|t, budget| t.remove_worker(worker_id, budget))?;
        debug!("Deleted worker {} ({:?})", worker_id, summary);
        Ok(summary)
    }

    // ==================== Activity Records ====================

    async fn insert_activity(&self, record: &NewActivityRecord) -> RepositoryResult<ActivityRecord> {
        let span = normalize(record.span)?;
        self.write(|t| {
            if !t.workers.contains_key(&record.worker_id) {
                return Err(not_found("worker", record.worker_id, "insert_activity"));
            }
            if !t.activity_kinds.contains_key(&record.activity_kind_id) {
                return Err(not_found(
                    "activity_kind",
                    record.activity_kind_id,
                    "insert_activity",
                ));
            }
            let id = ActivityRecordId(t.next_activity_id);
            t.next_activity_id += 1;
            let stored = ActivityRecord {
                id,
                worker_id: record.worker_id,
                activity_kind_id: record.activity_kind_id,
                span,
            };
            t.activities.insert(id, stored.clone());
            Ok(stored)
        })
    }

    async fn close_activity(
        &self,
        record_id: ActivityRecordId,
        ended_at: Timestamp,
    ) -> RepositoryResult<ActivityRecord> {
        self.write(|t| {
            let record = t
                .activities
                .get_mut(&record_id)
                .ok_or_else(|| not_found("activity", record_id, "close_activity"))?;
            record.span = record.span.close(to_seconds(ended_at))?;
            Ok(record.clone())
        })
    }

    async fn activities_for_worker(&self, worker_id: WorkerId) -> RepositoryResult<Vec<ActivityRecord>> {
        self.read(|t| {
            t.activities
                .values()
                .filter(|a| a.worker_id == worker_id)
                .cloned()
                .collect()
        })
    }

    async fn activities_of_kind(&self, kind_id: ActivityKindId) -> RepositoryResult<Vec<ActivityRecord>> {
        self.read(|t| {
            t.activities
                .values()
                .filter(|a| a.activity_kind_id == kind_id)
                .cloned()
                .collect()
        })
    }

    async fn activities_in_window(&self, window: &TimeWindow) -> RepositoryResult<Vec<ActivityRecord>> {
        self.read(|t| filter_overlapping(t.activities.values().cloned(), window))
    }

    // ==================== Snapshots ====================

    async fn insert_snapshot(&self, snapshot: &NewFrameSnapshot) -> RepositoryResult<FrameSnapshot> {
        if snapshot.worker_count < 0 {
            return Err(RepositoryError::validation(format!(
                "Snapshot worker count must not be negative, got {}",
                snapshot.worker_count
            )));
        }
        self.write(|t| {
            if !t.trains.contains_key(&snapshot.train_id) {
                return Err(not_found("train", snapshot.train_id, "insert_snapshot"));
            }
            let id = SnapshotId(t.next_snapshot_id);
            t.next_snapshot_id += 1;
            let stored = FrameSnapshot {
                id,
                timestamp: to_seconds(snapshot.timestamp),
                worker_count: snapshot.worker_count,
                train_id: snapshot.train_id,
            };
            t.snapshots.insert(id, stored.clone());
            Ok(stored)
        })
    }

    async fn snapshots_in_window(&self, window: &TimeWindow) -> RepositoryResult<Vec<FrameSnapshot>> {
        self.read(|t| {
            let mut inside: Vec<FrameSnapshot> = t
                .snapshots
                .values()
                .filter(|s| window.contains(s.timestamp))
                .cloned()
                .collect();
            inside.sort_by_key(|s| (s.timestamp, s.id));
            inside
        })
    }

    // ==================== Incidents ====================

    async fn insert_incident(&self, incident: &NewIncident) -> RepositoryResult<Incident> {
        self.write(|t| {
            if !t.workers.contains_key(&incident.worker_id) {
                return Err(not_found("worker", incident.worker_id, "insert_incident"));
            }
            let id = IncidentId(t.next_incident_id);
            t.next_incident_id += 1;
            let stored = Incident {
                id,
                worker_id: incident.worker_id,
                incident_type: incident.incident_type.clone(),
                message: incident.message.clone(),
                occurred_at: to_seconds(incident.occurred_at),
            };
            t.incidents.insert(id, stored.clone());
            Ok(stored)
        })
    }

    async fn incidents_since(
        &self,
        since: Timestamp,
        incident_type: Option<&str>,
    ) -> RepositoryResult<Vec<Incident>> {
        self.read(|t| {
            t.incidents
                .values()
                .filter(|i| i.occurred_at >= since)
                .filter(|i| incident_type.map_or(true, |ty| i.incident_type == ty))
                .cloned()
                .collect()
        })
    }

    // ==================== Counts ====================

    async fn worker_counts_by_train(&self) -> RepositoryResult<Vec<TrainWorkerCount>> {
        self.read(|t| {
            let mut per_train: BTreeMap<TrainId, i64> = BTreeMap::new();
            for worker in t.workers.values() {
                *per_train.entry(worker.train_id).or_default() += 1;
            }
            per_train
                .into_iter()
                .filter_map(|(train_id, worker_count)| {
                    t.trains.get(&train_id).map(|train| TrainWorkerCount {
                        train_id,
                        train_number: train.number.clone(),
                        worker_count,
                    })
                })
                .collect()
        })
    }

    async fn safety_counts(&self) -> RepositoryResult<SafetyCounts> {
        self.read(|t| SafetyCounts {
            total: t.workers.len() as i64,
            flagged: t.workers.values().filter(|w| w.helmet_on).count() as i64,
        })
    }
}

#[async_trait]
impl AnalyticsRepository for LocalRepository {
    async fn recompute_mean_durations(
        &self,
        active_kind: ActivityKindId,
        now: Timestamp,
    ) -> RepositoryResult<Vec<MeanDuration>> {
        let now = to_seconds(now);
        let stored = self.write_atomically(|t, _| {
            if !t.activity_kinds.contains_key(&active_kind) {
                return Err(not_found(
                    "activity_kind",
                    active_kind,
                    "recompute_mean_durations",
                ));
            }

            let uniforms: Vec<Uniform> = t.uniforms.values().cloned().collect();
            let workers: Vec<Worker> = t.workers.values().cloned().collect();
            let activities: Vec<ActivityRecord> = t.activities.values().cloned().collect();
            let samples = compute_mean_durations(&uniforms, &workers, &activities, active_kind);

            let mut stored = Vec::with_capacity(samples.len());
            for sample in samples {
                let id = match t.mean_durations.get(&sample.uniform_id) {
                    Some(existing) => existing.id,
                    None => {
                        let id = MeanDurationId(t.next_mean_duration_id);
                        t.next_mean_duration_id += 1;
                        id
                    }
                };
                let row = MeanDuration {
                    id,
                    uniform_id: sample.uniform_id,
                    mean_seconds: sample.mean_seconds,
                    worker_count: sample.worker_count,
                    activity_count: sample.activity_count,
                    last_updated: now,
                };
                t.mean_durations.insert(row.uniform_id, row.clone());
                stored.push(row);
            }
            Ok(stored)
        })?;

        info!("Recomputed mean durations for {} uniforms", stored.len());
        Ok(stored)
    }

    async fn get_mean_duration(&self, uniform_id: UniformId) -> RepositoryResult<Option<MeanDuration>> {
        self.read(|t| t.mean_durations.get(&uniform_id).cloned())
    }

    async fn list_mean_durations(&self) -> RepositoryResult<Vec<MeanDuration>> {
        self.read(|t| t.mean_durations.values().cloned().collect())
    }
}

#[async_trait]
impl RetentionRepository for LocalRepository {
    async fn record_counts(&self) -> RepositoryResult<RecordCounts> {
        self.read(|t| t.record_counts())
    }

    async fn enforce_retention(&self, policy: &RetentionPolicy) -> RepositoryResult<RetentionReport> {
        let report = self.write_atomically(|t, budget| {
            let counts_before = t.record_counts();
            if !policy.is_triggered(counts_before) {
                return Ok(RetentionReport::untouched(counts_before));
            }

            let workers: Vec<Worker> = t.workers.values().cloned().collect();
            let activities: Vec<ActivityRecord> = t.activities.values().cloned().collect();
            let plan = plan_eviction(policy, &workers, &activities);

            for record_id in &plan.activities {
                spend_delete(budget, "enforce_retention")?;
                t.activities.remove(record_id);
            }

            let mut cascaded_activities = 0;
            let mut cascaded_incidents = 0;
            for worker_id in &plan.workers {
                let removed = t
                    .remove_worker(*worker_id, budget)
                    .map_err(|e| e.with_operation("enforce_retention"))?;
                cascaded_activities += removed.activities;
                cascaded_incidents += removed.incidents;
            }

            Ok(RetentionReport {
                triggered: true,
                counts_before,
                counts_after: t.record_counts(),
                evicted_activities: plan.activities,
                evicted_workers: plan.workers,
                cascaded_activities,
                cascaded_incidents,
            })
        });

        match &report {
            Ok(r) if r.triggered => warn!(
                "Retention evicted {} activities and {} workers ({:?} -> {:?})",
                r.evicted_activities.len(),
                r.evicted_workers.len(),
                r.counts_before,
                r.counts_after
            ),
            Ok(_) => debug!("Retention below threshold, nothing evicted"),
            Err(e) => warn!("Retention cycle rolled back: {}", e),
        }
        report
    }
}
