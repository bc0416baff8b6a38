//! HTTP handlers for the REST API.
//!
//! Each handler corresponds to an API endpoint and delegates to the
//! service layer in [`crate::db::services`].

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Duration, Utc};

use super::dto::{
    ActivityNameQuery, ConcurrencyResponse, HealthResponse, HelmetUsageResponse, HoursQuery,
    LimitQuery, ListResponse, PeakPeriodsQuery, RecentIncidentsQuery, TrainActivityQuery,
    WindowQuery, DEFAULT_BUSIEST_LIMIT, DEFAULT_INCIDENT_MINUTES, DEFAULT_LOOKBACK_HOURS,
    DEFAULT_PEAK_MIN_WORKERS,
};
use super::error::AppError;
use super::state::AppState;
use crate::db::services as db_services;
use crate::models::{
    FrameSnapshot, Incident, MeanDuration, TimeWindow, TrainId, TrainWorkerCount, UniformId,
    Worker, WorkerId,
};
use crate::services::{
    ActivityTimelineEntry, OverlapEntity, OverlapRecord, PresenceEntry, RetentionReport,
    UniformActivityTime,
};

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

fn trailing_hours(hours: Option<i64>) -> Result<TimeWindow, AppError> {
    let hours = hours.unwrap_or(DEFAULT_LOOKBACK_HOURS);
    let lookback = Duration::try_hours(hours)
        .ok_or_else(|| AppError::BadRequest(format!("hours out of range: {}", hours)))?;
    Ok(db_services::trailing_window(Utc::now(), lookback)?)
}

// =============================================================================
// Health Check
// =============================================================================

/// GET /health
///
/// Health check endpoint to verify the service is running and the store is reachable.
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let db_status = match db_services::health_check(state.repository.as_ref()).await {
        Ok(true) => "connected".to_string(),
        Ok(false) => "disconnected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: "v1".to_string(),
        database: db_status,
    }))
}

// =============================================================================
// Overlap Queries
// =============================================================================

/// GET /v1/overlaps/{entity}?start&end[&order=chronological]
pub async fn get_overlaps(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(query): Query<WindowQuery>,
) -> HandlerResult<ListResponse<OverlapRecord>> {
    let entity: OverlapEntity = entity.parse().map_err(AppError::BadRequest)?;
    let window = db_services::window(query.start, query.end)?;
    let records = db_services::overlaps(
        state.repository.as_ref(),
        entity,
        &window,
        query.chronological(),
    )
    .await?;
    Ok(Json(records.into()))
}

/// GET /v1/concurrency/peak?start&end
pub async fn get_peak_concurrency(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> HandlerResult<ConcurrencyResponse> {
    let window = db_services::window(query.start, query.end)?;
    let peak = db_services::peak_concurrency(state.repository.as_ref(), &window).await?;
    Ok(Json(ConcurrencyResponse { peak }))
}

// =============================================================================
// Mean Durations
// =============================================================================

/// GET /v1/mean-durations
pub async fn list_mean_durations(
    State(state): State<AppState>,
) -> HandlerResult<ListResponse<MeanDuration>> {
    let rows = db_services::list_mean_durations(state.repository.as_ref()).await?;
    Ok(Json(rows.into()))
}

/// GET /v1/mean-durations/{uniform_id}
pub async fn get_mean_duration(
    State(state): State<AppState>,
    Path(uniform_id): Path<i32>,
) -> HandlerResult<MeanDuration> {
    let row =
        db_services::mean_duration(state.repository.as_ref(), UniformId::new(uniform_id)).await?;
    Ok(Json(row))
}

/// POST /v1/mean-durations/recompute
pub async fn recompute_mean_durations(
    State(state): State<AppState>,
) -> HandlerResult<ListResponse<MeanDuration>> {
    let rows = db_services::recompute_all_mean_durations(
        state.repository.as_ref(),
        state.analytics(),
        Utc::now(),
    )
    .await?;
    Ok(Json(rows.into()))
}

// =============================================================================
// Summary Statistics
// =============================================================================

/// GET /v1/safety/helmet-usage
pub async fn get_helmet_usage(State(state): State<AppState>) -> HandlerResult<HelmetUsageResponse> {
    let percentage = db_services::safety_usage_percentage(state.repository.as_ref()).await?;
    Ok(Json(HelmetUsageResponse { percentage }))
}

/// GET /v1/trains/busiest?limit
pub async fn get_busiest_trains(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> HandlerResult<ListResponse<TrainWorkerCount>> {
    let limit = query.limit.unwrap_or(DEFAULT_BUSIEST_LIMIT);
    let ranked = db_services::busiest_trains(state.repository.as_ref(), limit).await?;
    Ok(Json(ranked.into()))
}

/// GET /v1/peak-periods?min_workers&hours
pub async fn get_peak_periods(
    State(state): State<AppState>,
    Query(query): Query<PeakPeriodsQuery>,
) -> HandlerResult<ListResponse<FrameSnapshot>> {
    let window = trailing_hours(query.hours)?;
    let min_workers = query.min_workers.unwrap_or(DEFAULT_PEAK_MIN_WORKERS);
    let peaks = db_services::peak_periods(state.repository.as_ref(), min_workers, &window).await?;
    Ok(Json(peaks.into()))
}

/// GET /v1/uniforms/activity-time?activity
pub async fn get_activity_time_by_uniform(
    State(state): State<AppState>,
    Query(query): Query<ActivityNameQuery>,
) -> HandlerResult<ListResponse<UniformActivityTime>> {
    let totals =
        db_services::activity_time_by_uniform(state.repository.as_ref(), &query.activity).await?;
    Ok(Json(totals.into()))
}

// =============================================================================
// Timelines
// =============================================================================

/// GET /v1/trains/{train_id}/presence?hours
pub async fn get_presence_timeline(
    State(state): State<AppState>,
    Path(train_id): Path<i64>,
    Query(query): Query<HoursQuery>,
) -> HandlerResult<ListResponse<PresenceEntry>> {
    let window = trailing_hours(query.hours)?;
    let entries =
        db_services::presence_timeline(state.repository.as_ref(), TrainId::new(train_id), &window)
            .await?;
    Ok(Json(entries.into()))
}

/// GET /v1/trains/by-number/{number}/workers?activity&start&end
pub async fn get_workers_on_train_activity(
    State(state): State<AppState>,
    Path(number): Path<String>,
    Query(query): Query<TrainActivityQuery>,
) -> HandlerResult<ListResponse<Worker>> {
    let window = db_services::window(query.start, query.end)?;
    let workers = db_services::workers_on_train_activity(
        state.repository.as_ref(),
        &number,
        &query.activity,
        &window,
    )
    .await?;
    Ok(Json(workers.into()))
}

/// GET /v1/workers/{worker_id}/timeline
pub async fn get_worker_timeline(
    State(state): State<AppState>,
    Path(worker_id): Path<i64>,
) -> HandlerResult<ListResponse<ActivityTimelineEntry>> {
    let entries =
        db_services::worker_activity_timeline(state.repository.as_ref(), WorkerId::new(worker_id))
            .await?;
    Ok(Json(entries.into()))
}

// =============================================================================
// Incidents & Retention
// =============================================================================

/// GET /v1/incidents/recent?minutes[&type]
pub async fn get_recent_incidents(
    State(state): State<AppState>,
    Query(query): Query<RecentIncidentsQuery>,
) -> HandlerResult<ListResponse<Incident>> {
    let minutes = query.minutes.unwrap_or(DEFAULT_INCIDENT_MINUTES);
    let lookback = Duration::try_minutes(minutes)
        .ok_or_else(|| AppError::BadRequest(format!("minutes out of range: {}", minutes)))?;
    let incidents = db_services::recent_incidents(
        state.repository.as_ref(),
        lookback,
        query.incident_type.as_deref(),
        Utc::now(),
    )
    .await?;
    Ok(Json(incidents.into()))
}

/// POST /v1/retention/enforce
pub async fn enforce_retention(State(state): State<AppState>) -> HandlerResult<RetentionReport> {
    let report =
        db_services::enforce_retention(state.repository.as_ref(), state.retention_policy()).await?;
    Ok(Json(report))
}
