//! High-level service layer.
//!
//! Repository-agnostic operations that work with any implementation of the
//! repository traits. Each function loads what it needs from the store and
//! hands it to the pure engines in [`crate::services`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Application Layer (HTTP handlers, server maintenance)  │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Service Layer (services.rs)                            │
//! │  - window validation before any store access            │
//! │  - active-kind resolution for the mean durations        │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Repository Traits (repository/)                        │
//! └───────────────────┬─────────────────────────────────────┘
//!     ┌───────────────┴────────────────┐
//! ┌───▼──────────────┐     ┌───────────▼─────────────┐
//! │ Postgres (Diesel)│     │ Local Repository        │
//! └──────────────────┘     └─────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use depot_analytics::db::{services, repositories::LocalRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repo = LocalRepository::new();
//!     let pct = services::safety_usage_percentage(&repo).await?;
//!     println!("Helmet usage: {:.1}%", pct);
//!     Ok(())
//! }
//! ```

use chrono::Duration;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::repo_config::AnalyticsSettings;
use super::repository::{ErrorContext, FullRepository, RepositoryError, RepositoryResult};
use crate::models::{
    ActivityKind, FrameSnapshot, Incident, MeanDuration, TimeWindow, Timestamp, TrainId,
    TrainWorkerCount, UniformId, Worker, WorkerId,
};
use crate::services::aggregation::{self, UniformActivityTime};
use crate::services::concurrency::{self, ConcurrencyPeak};
use crate::services::overlap::{sort_chronologically, OverlapEntity, OverlapRecord};
use crate::services::recency;
use crate::services::retention::{RetentionPolicy, RetentionReport};
use crate::services::timeline::{self, ActivityTimelineEntry, PresenceEntry};

/// Build a query window, rejecting `start > end` with `InvalidWindow`.
pub fn window(start: Timestamp, end: Timestamp) -> RepositoryResult<TimeWindow> {
    Ok(TimeWindow::new(start, end)?)
}

/// `[now - lookback, now]`; rejects a negative lookback and one reaching
/// past the earliest representable timestamp.
pub fn trailing_window(now: Timestamp, lookback: Duration) -> RepositoryResult<TimeWindow> {
    if lookback < Duration::zero() {
        return Err(RepositoryError::invalid_window(format!(
            "Trailing window length must not be negative, got {}s",
            lookback.num_seconds()
        )));
    }
    Ok(TimeWindow::trailing(now, lookback)?)
}

async fn activity_kind_named<R: FullRepository + ?Sized>(
    repo: &R,
    name: &str,
    operation: &str,
) -> RepositoryResult<ActivityKind> {
    repo.find_activity_kind(name).await?.ok_or_else(|| {
        RepositoryError::not_found_with_context(
            format!("Activity kind '{}' is not registered", name),
            ErrorContext::new(operation).with_entity("activity_kind"),
        )
    })
}

// ==================== Health & Connection ====================

/// Check if the store is healthy.
pub async fn health_check<R: FullRepository + ?Sized>(repo: &R) -> RepositoryResult<bool> {
    repo.health_check().await
}

// ==================== Overlap Queries ====================

/// Records of one family whose interval overlaps `window`.
///
/// Results come in id order, or by start time when `chronological` is set.
/// An empty result is a valid answer.
pub async fn overlaps<R: FullRepository + ?Sized>(
    repo: &R,
    entity: OverlapEntity,
    window: &TimeWindow,
    chronological: bool,
) -> RepositoryResult<Vec<OverlapRecord>> {
    let mut records: Vec<OverlapRecord> = match entity {
        OverlapEntity::Train => repo
            .trains_in_window(window)
            .await?
            .into_iter()
            .map(OverlapRecord::Train)
            .collect(),
        OverlapEntity::Worker => repo
            .workers_in_window(window)
            .await?
            .into_iter()
            .map(OverlapRecord::Worker)
            .collect(),
        OverlapEntity::Activity => repo
            .activities_in_window(window)
            .await?
            .into_iter()
            .map(OverlapRecord::Activity)
            .collect(),
    };
    if chronological {
        sort_chronologically(&mut records);
    }
    debug!(
        "{} {:?} records overlap [{}, {}]",
        records.len(),
        entity,
        window.start(),
        window.end()
    );
    Ok(records)
}

// ==================== Mean Durations ====================

/// Stored mean duration for one uniform.
///
/// # Returns
/// * `Err(RepositoryError::NotFound)` - If it was never computed
pub async fn mean_duration<R: FullRepository + ?Sized>(
    repo: &R,
    uniform_id: UniformId,
) -> RepositoryResult<MeanDuration> {
    repo.get_mean_duration(uniform_id).await?.ok_or_else(|| {
        RepositoryError::not_found_with_context(
            format!("No mean duration stored for uniform {}", uniform_id),
            ErrorContext::new("mean_duration")
                .with_entity("mean_duration")
                .with_entity_id(uniform_id),
        )
    })
}

pub async fn list_mean_durations<R: FullRepository + ?Sized>(
    repo: &R,
) -> RepositoryResult<Vec<MeanDuration>> {
    repo.list_mean_durations().await
}

/// Recompute and persist the mean duration of the configured active kind
/// for every uniform.
///
/// Idempotent: with unchanged data only `last_updated` moves.
pub async fn recompute_all_mean_durations<R: FullRepository + ?Sized>(
    repo: &R,
    settings: &AnalyticsSettings,
    now: Timestamp,
) -> RepositoryResult<Vec<MeanDuration>> {
    let kind = activity_kind_named(
        repo,
        &settings.active_activity,
        "recompute_all_mean_durations",
    )
    .await?;
    let updated = repo.recompute_mean_durations(kind.id, now).await?;
    info!(
        "Mean durations of '{}' updated for {} uniforms",
        kind.name,
        updated.len()
    );
    Ok(updated)
}

// ==================== Summary Statistics ====================

/// Percentage of workers wearing a helmet; 0 when there are no workers.
pub async fn safety_usage_percentage<R: FullRepository + ?Sized>(repo: &R) -> RepositoryResult<f64> {
    let counts = repo.safety_counts().await?;
    Ok(aggregation::safety_usage_percentage(counts))
}

/// Trains with the most workers, at most `limit` of them.
pub async fn busiest_trains<R: FullRepository + ?Sized>(
    repo: &R,
    limit: usize,
) -> RepositoryResult<Vec<TrainWorkerCount>> {
    let counts = repo.worker_counts_by_train().await?;
    Ok(aggregation::rank_busiest(counts, limit))
}

/// Snapshots inside `window` with at least `min_workers` in frame, most
/// crowded first.
pub async fn peak_periods<R: FullRepository + ?Sized>(
    repo: &R,
    min_workers: i32,
    window: &TimeWindow,
) -> RepositoryResult<Vec<FrameSnapshot>> {
    let snapshots = repo.snapshots_in_window(window).await?;
    Ok(aggregation::peak_periods(snapshots, min_workers))
}

/// Exact peak of simultaneous worker presence inside `window`.
pub async fn peak_concurrency<R: FullRepository + ?Sized>(
    repo: &R,
    window: &TimeWindow,
) -> RepositoryResult<Option<ConcurrencyPeak>> {
    let workers = repo.workers_in_window(window).await?;
    Ok(concurrency::peak_concurrency(&workers, window))
}

/// Total closed-record time of the named activity per uniform.
pub async fn activity_time_by_uniform<R: FullRepository + ?Sized>(
    repo: &R,
    activity_name: &str,
) -> RepositoryResult<Vec<UniformActivityTime>> {
    let kind = activity_kind_named(repo, activity_name, "activity_time_by_uniform").await?;
    let uniforms = repo.list_uniforms().await?;
    let workers = repo.list_workers().await?;
    let records = repo.activities_of_kind(kind.id).await?;
    Ok(aggregation::activity_time_by_uniform(
        &uniforms, &workers, &records, kind.id,
    ))
}

// ==================== Incidents ====================

/// Incidents within the trailing `lookback`, newest first.
///
/// An empty result means no incident currently needs attention.
pub async fn recent_incidents<R: FullRepository + ?Sized>(
    repo: &R,
    lookback: Duration,
    incident_type: Option<&str>,
    now: Timestamp,
) -> RepositoryResult<Vec<Incident>> {
    let window = trailing_window(now, lookback)?;
    let incidents = repo.incidents_since(window.start(), incident_type).await?;
    Ok(recency::recent_incidents(
        incidents,
        window.start(),
        incident_type,
    ))
}

// ==================== Retention ====================

/// Run one retention cycle with `policy`.
pub async fn enforce_retention<R: FullRepository + ?Sized>(
    repo: &R,
    policy: &RetentionPolicy,
) -> RepositoryResult<RetentionReport> {
    policy.validate()?;
    repo.enforce_retention(policy).await
}

/// Outcome of one background maintenance cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub retention: RetentionReport,
    pub mean_durations_updated: usize,
}

/// Retention followed by the mean-duration recompute.
///
/// A store without the active activity kind skips the recompute; every
/// other failure is returned.
pub async fn run_maintenance_cycle<R: FullRepository + ?Sized>(
    repo: &R,
    policy: &RetentionPolicy,
    analytics: &AnalyticsSettings,
    now: Timestamp,
) -> RepositoryResult<MaintenanceReport> {
    let retention = enforce_retention(repo, policy).await?;

    let mean_durations_updated = match recompute_all_mean_durations(repo, analytics, now).await {
        Ok(updated) => updated.len(),
        Err(RepositoryError::NotFound { message, .. }) => {
            warn!("Skipping mean duration recompute: {}", message);
            0
        }
        Err(e) => return Err(e),
    };

    Ok(MaintenanceReport {
        retention,
        mean_durations_updated,
    })
}

// ==================== Timelines ====================

/// Workers of the trains numbered `train_number` who did an activity whose
/// name contains `activity_pattern` during `window`.
pub async fn workers_on_train_activity<R: FullRepository + ?Sized>(
    repo: &R,
    train_number: &str,
    activity_pattern: &str,
    window: &TimeWindow,
) -> RepositoryResult<Vec<Worker>> {
    let trains = repo.find_trains_by_number(train_number).await?;
    if trains.is_empty() {
        return Ok(Vec::new());
    }

    let mut workers = Vec::new();
    for train in &trains {
        workers.extend(repo.workers_for_train(train.id).await?);
    }
    let kinds = repo.list_activity_kinds().await?;
    let activities = repo.activities_in_window(window).await?;

    Ok(timeline::workers_with_matching_activity(
        &workers,
        &activities,
        &kinds,
        activity_pattern,
        window,
    ))
}

/// Presence chart of one train's workers inside `window`.
pub async fn presence_timeline<R: FullRepository + ?Sized>(
    repo: &R,
    train_id: TrainId,
    window: &TimeWindow,
) -> RepositoryResult<Vec<PresenceEntry>> {
    repo.get_train(train_id).await?;
    let workers = repo.workers_for_train(train_id).await?;
    let uniforms = repo.list_uniforms().await?;
    Ok(timeline::presence_timeline(workers, &uniforms, window))
}

/// One worker's activities in start order.
pub async fn worker_activity_timeline<R: FullRepository + ?Sized>(
    repo: &R,
    worker_id: WorkerId,
) -> RepositoryResult<Vec<ActivityTimelineEntry>> {
    repo.get_worker(worker_id).await?;
    let records = repo.activities_for_worker(worker_id).await?;
    let kinds = repo.list_activity_kinds().await?;
    Ok(timeline::activity_timeline(records, &kinds))
}
