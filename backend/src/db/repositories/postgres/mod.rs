//! Postgres repository implementation using Diesel.
//!
//! ## Features
//!
//! - Connection pooling with r2d2
//! - Automatic retry for transient failures on single-statement operations
//! - Connection health monitoring
//! - Automatic migration execution
//!
//! Multi-step writes (cascading deletes, retention cycles, mean-duration
//! recomputes) run inside one transaction and are attempted exactly once:
//! a failure rolls the transaction back and is returned to the caller.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
//! - `PG_POOL_MAX`: Maximum pool size (default: 10)
//! - `PG_POOL_MIN`: Minimum pool size (default: 1)
//! - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
//! - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)
//! - `PG_MAX_RETRIES`: Maximum retry attempts for transient failures (default: 3)
//! - `PG_RETRY_DELAY_MS`: Initial retry delay in milliseconds (default: 100)

use async_trait::async_trait;
use diesel::dsl::count;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel::upsert::excluded;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::task;

use crate::db::repository::{
    AnalyticsRepository, DepotRepository, ErrorContext, RepositoryError, RepositoryResult,
    RetentionRepository,
};
use crate::models::{
    to_seconds, ActivityKind, ActivityKindId, ActivityRecord, ActivityRecordId, CascadeSummary,
    FrameSnapshot, Incident, Interval, MeanDuration, NewActivityRecord, NewFrameSnapshot,
    NewIncident, NewTrain, NewWorker, RecordCounts, SafetyCounts, TimeWindow, Timestamp, Train,
    TrainId, TrainWorkerCount, Uniform, UniformId, Worker, WorkerId,
};
use crate::services::aggregation::compute_mean_durations;
use crate::services::retention::{RetentionPolicy, RetentionReport};

mod models;
mod schema;

use models::*;
use schema::*;

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

/// Configuration for connecting to Postgres.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_pool_size: u32,
    /// Minimum number of connections in the pool
    pub min_pool_size: u32,
    /// Connection timeout in seconds
    pub connection_timeout_sec: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_sec: u64,
    /// Maximum number of retry attempts for transient failures
    pub max_retries: u32,
    /// Initial retry delay in milliseconds (doubles with each retry)
    pub retry_delay_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            min_pool_size: 1,
            connection_timeout_sec: 30,
            idle_timeout_sec: 600,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl PostgresConfig {
    /// Create configuration from environment variables.
    ///
    /// See the module documentation for the variables and their defaults.
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| "DATABASE_URL or PG_DATABASE_URL must be set".to_string())?;

        let defaults = Self::default();
        Ok(Self {
            database_url,
            max_pool_size: env_or("PG_POOL_MAX", defaults.max_pool_size),
            min_pool_size: env_or("PG_POOL_MIN", defaults.min_pool_size),
            connection_timeout_sec: env_or("PG_CONN_TIMEOUT_SEC", defaults.connection_timeout_sec),
            idle_timeout_sec: env_or("PG_IDLE_TIMEOUT_SEC", defaults.idle_timeout_sec),
            max_retries: env_or("PG_MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: env_or("PG_RETRY_DELAY_MS", defaults.retry_delay_ms),
        })
    }

    /// Create a new configuration with a database URL.
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }
}

/// Diesel-backed repository for Postgres.
#[derive(Clone, Debug)]
pub struct PostgresRepository {
    pool: PgPool,
    config: PostgresConfig,
}

impl PostgresRepository {
    /// Create a new repository and run pending migrations.
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .test_on_check_out(true)
            .build(manager)
            .map_err(|e| {
                RepositoryError::unavailable_with_context(
                    e.to_string(),
                    ErrorContext::new("create_pool")
                        .with_details(format!("max_size={}", config.max_pool_size)),
                )
            })?;

        {
            let mut conn = pool.get().map_err(|e| {
                RepositoryError::unavailable_with_context(
                    e.to_string(),
                    ErrorContext::new("get_connection_for_migrations"),
                )
            })?;
            Self::run_migrations(&mut conn)?;
        }

        info!(
            "Postgres repository ready (pool max={}, min={})",
            config.max_pool_size, config.min_pool_size
        );

        Ok(Self { pool, config })
    }

    /// Run pending database migrations.
    fn run_migrations(conn: &mut PgConnection) -> RepositoryResult<()> {
        conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Migration failed: {}", e),
                ErrorContext::new("run_migrations"),
            )
        })?;

        Ok(())
    }

    /// Execute a database operation with automatic retry for transient failures.
    async fn with_conn<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static + Clone,
    {
        self.run_blocking(self.config.max_retries, f).await
    }

    /// Execute a transactional operation exactly once.
    async fn with_transaction<T, F>(&self, operation: &'static str, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static + Clone,
    {
        self.run_blocking(0, move |conn| conn.transaction(f))
            .await
            .map_err(|e| {
                warn!("Transaction '{}' rolled back: {}", operation, e);
                e.with_operation(operation)
            })
    }

    async fn run_blocking<T, F>(&self, max_retries: u32, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static + Clone,
    {
        let pool = self.pool.clone();
        let retry_delay_ms = self.config.retry_delay_ms;

        task::spawn_blocking(move || {
            let mut last_error = None;
            let mut retry_delay = Duration::from_millis(retry_delay_ms);

            for attempt in 0..=max_retries {
                if attempt > 0 {
                    debug!("Retrying store operation (attempt {})", attempt + 1);
                    std::thread::sleep(retry_delay);
                    retry_delay *= 2;
                }

                let mut conn = match pool.get() {
                    Ok(c) => c,
                    Err(e) => {
                        let err = RepositoryError::unavailable_with_context(
                            e.to_string(),
                            ErrorContext::new("get_connection")
                                .with_details(format!("attempt={}", attempt + 1)),
                        );
                        if attempt < max_retries {
                            last_error = Some(err);
                            continue;
                        }
                        return Err(err);
                    }
                };

                match f.clone()(&mut conn) {
                    Ok(result) => return Ok(result),
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        last_error = Some(e);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            Err(last_error.unwrap_or_else(|| {
                RepositoryError::internal("Max retries exceeded with no error captured")
            }))
        })
        .await
        .map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new("spawn_blocking"),
            )
        })?
    }
}

fn map_diesel_error(err: diesel::result::Error) -> RepositoryError {
    RepositoryError::from(err)
}

fn missing(entity: &str, id: impl ToString, operation: &str) -> RepositoryError {
    let id = id.to_string();
    RepositoryError::not_found_with_context(
        format!("{} {} not found", entity, id),
        ErrorContext::new(operation)
            .with_entity(entity)
            .with_entity_id(id),
    )
}

fn normalize(interval: Interval) -> RepositoryResult<Interval> {
    Ok(Interval::new(
        to_seconds(interval.start()),
        interval.end().map(to_seconds),
    )?)
}

/// Rows cascaded by deleting `worker_ids`, counted before the delete.
fn count_owned_rows(conn: &mut PgConnection, worker_ids: &[i64]) -> RepositoryResult<(usize, usize)> {
    let activities: i64 = worker_activities::table
        .filter(worker_activities::worker_id.eq_any(worker_ids))
        .count()
        .get_result(conn)
        .map_err(map_diesel_error)?;
    let incidents: i64 = alerts::table
        .filter(alerts::worker_id.eq_any(worker_ids))
        .count()
        .get_result(conn)
        .map_err(map_diesel_error)?;
    Ok((activities as usize, incidents as usize))
}

fn load_record_counts(conn: &mut PgConnection) -> RepositoryResult<RecordCounts> {
    let workers: i64 = workers::table
        .count()
        .get_result(conn)
        .map_err(map_diesel_error)?;
    let activities: i64 = worker_activities::table
        .count()
        .get_result(conn)
        .map_err(map_diesel_error)?;
    Ok(RecordCounts {
        workers: workers as usize,
        activities: activities as usize,
    })
}

#[async_trait]
impl DepotRepository for PostgresRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn(|conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(map_diesel_error)
        })
        .await
    }

    // ==================== Trains ====================

    async fn insert_train(&self, train: &NewTrain) -> RepositoryResult<Train> {
        let stay = normalize(train.stay)?;
        let row = NewTrainRow {
            train_number: train.number.clone(),
            arrival_time: stay.start(),
            departure_time: stay.end(),
        };
        self.with_conn(move |conn| {
            diesel::insert_into(trains::table)
                .values(&row)
                .returning(TrainRow::as_returning())
                .get_result::<TrainRow>(conn)
                .map_err(map_diesel_error)?
                .try_into()
        })
        .await
    }

    async fn get_train(&self, train_id: TrainId) -> RepositoryResult<Train> {
        self.with_conn(move |conn| {
            trains::table
                .find(train_id.value())
                .select(TrainRow::as_select())
                .first::<TrainRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .ok_or_else(|| missing("train", train_id, "get_train"))?
                .try_into()
        })
        .await
    }

    async fn find_trains_by_number(&self, number: &str) -> RepositoryResult<Vec<Train>> {
        let number = number.to_string();
        self.with_conn(move |conn| {
            let rows = trains::table
                .filter(trains::train_number.eq(&number))
                .order(trains::id.asc())
                .select(TrainRow::as_select())
                .load::<TrainRow>(conn)
                .map_err(map_diesel_error)?;
            convert_all(rows)
        })
        .await
    }

    async fn close_train(
        &self,
        train_id: TrainId,
        departed_at: Timestamp,
    ) -> RepositoryResult<Train> {
        let departed_at = to_seconds(departed_at);
        self.with_transaction("close_train", move |conn| {
            let current: Train = trains::table
                .find(train_id.value())
                .select(TrainRow::as_select())
                .for_update()
                .first::<TrainRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .ok_or_else(|| missing("train", train_id, "close_train"))?
                .try_into()?;
            let stay = current.stay.close(departed_at)?;

            diesel::update(trains::table.find(train_id.value()))
                .set(trains::departure_time.eq(stay.end()))
                .returning(TrainRow::as_returning())
                .get_result::<TrainRow>(conn)
                .map_err(map_diesel_error)?
                .try_into()
        })
        .await
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

        let summary = self
            .with_transaction("delete_train", move |conn| {
                let worker_ids: Vec<i64> = workers::table
                    .filter(workers::train_id.eq(train_id.value()))
                    .select(workers::id)
                    .load(conn)
                    .map_err(map_diesel_error)?;
                let (activities, incidents) = count_owned_rows(conn, &worker_ids)?;
                let snapshots: i64 = frame_statistics::table
                    .filter(frame_statistics::train_id.eq(train_id.value()))
                    .count()
                    .get_result(conn)
                    .map_err(map_diesel_error)?;

                let deleted = diesel::delete(trains::table.find(train_id.value()))
                    .execute(conn)
                    .map_err(map_diesel_error)?;
                if deleted == 0 {
                    return Err(missing("train", train_id, "delete_train"));
                }

                Ok(CascadeSummary {
                    workers: worker_ids.len(),
                    activities,
                    incidents,
                    snapshots: snapshots as usize,
                })
            })
            .await?;

        info!("Deleted train {} ({:?})", train_id, summary);
        Ok(summary)
    }

    async fn trains_in_window(&self, window: &TimeWindow) -> RepositoryResult<Vec<Train>> {
        let window = *window;
        self.with_conn(move |conn| {
            let rows = trains::table
                .filter(trains::arrival_time.le(window.end()))
                .filter(
                    trains::departure_time
                        .is_null()
                        .or(trains::departure_time.ge(window.start())),
                )
                .order(trains::id.asc())
                .select(TrainRow::as_select())
                .load::<TrainRow>(conn)
                .map_err(map_diesel_error)?;
            convert_all(rows)
        })
        .await
    }

    // ==================== Reference Data ====================

    async fn insert_uniform(&self, label: &str) -> RepositoryResult<Uniform> {
        let label = label.to_string();
        self.with_conn(move |conn| {
            diesel::insert_into(uniforms::table)
                .values(uniforms::color.eq(&label))
                .returning(UniformRow::as_returning())
                .get_result::<UniformRow>(conn)
                .map(Uniform::from)
                .map_err(|e| map_diesel_error(e).with_operation("insert_uniform"))
        })
        .await
    }

    async fn list_uniforms(&self) -> RepositoryResult<Vec<Uniform>> {
        self.with_conn(|conn| {
            uniforms::table
                .order(uniforms::id.asc())
                .select(UniformRow::as_select())
                .load::<UniformRow>(conn)
                .map(|rows| rows.into_iter().map(Uniform::from).collect())
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn insert_activity_kind(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> RepositoryResult<ActivityKind> {
        let name = name.to_string();
        let description = description.map(str::to_string);
        self.with_conn(move |conn| {
            diesel::insert_into(activities::table)
                .values((
                    activities::name.eq(&name),
                    activities::description.eq(&description),
                ))
                .returning(ActivityKindRow::as_returning())
                .get_result::<ActivityKindRow>(conn)
                .map(ActivityKind::from)
                .map_err(|e| map_diesel_error(e).with_operation("insert_activity_kind"))
        })
        .await
    }

    async fn find_activity_kind(&self, name: &str) -> RepositoryResult<Option<ActivityKind>> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            activities::table
                .filter(activities::name.eq(&name))
                .select(ActivityKindRow::as_select())
                .first::<ActivityKindRow>(conn)
                .optional()
                .map(|row| row.map(ActivityKind::from))
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn list_activity_kinds(&self) -> RepositoryResult<Vec<ActivityKind>> {
        self.with_conn(|conn| {
            activities::table
                .order(activities::id.asc())
                .select(ActivityKindRow::as_select())
                .load::<ActivityKindRow>(conn)
                .map(|rows| rows.into_iter().map(ActivityKind::from).collect())
                .map_err(map_diesel_error)
        })
        .await
    }

    // ==================== Workers ====================

    async fn insert_worker(&self, worker: &NewWorker) -> RepositoryResult<Worker> {
        let presence = normalize(worker.presence)?;
        let row = NewWorkerRow {
            train_id: worker.train_id.value(),
            uniform_id: worker.uniform_id.value(),
            helmet_on: worker.helmet_on,
            appearance_time: presence.start(),
            disappearance_time: presence.end(),
        };
        self.with_conn(move |conn| {
            diesel::insert_into(workers::table)
                .values(&row)
                .returning(WorkerRow::as_returning())
                .get_result::<WorkerRow>(conn)
                .map_err(|e| map_diesel_error(e).with_operation("insert_worker"))?
                .try_into()
        })
        .await
    }

    async fn get_worker(&self, worker_id: WorkerId) -> RepositoryResult<Worker> {
        self.with_conn(move |conn| {
            workers::table
                .find(worker_id.value())
                .select(WorkerRow::as_select())
                .first::<WorkerRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .ok_or_else(|| missing("worker", worker_id, "get_worker"))?
                .try_into()
        })
        .await
    }

    async fn close_worker(
        &self,
        worker_id: WorkerId,
        left_at: Timestamp,
    ) -> RepositoryResult<Worker> {
        let left_at = to_seconds(left_at);
        self.with_transaction("close_worker", move |conn| {
            let current: Worker = workers::table
                .find(worker_id.value())
                .select(WorkerRow::as_select())
                .for_update()
                .first::<WorkerRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .ok_or_else(|| missing("worker", worker_id, "close_worker"))?
                .try_into()?;
            let presence = current.presence.close(left_at)?;

            diesel::update(workers::table.find(worker_id.value()))
                .set(workers::disappearance_time.eq(presence.end()))
                .returning(WorkerRow::as_returning())
                .get_result::<WorkerRow>(conn)
                .map_err(map_diesel_error)?
                .try_into()
        })
        .await
    }

    async fn list_workers(&self) -> RepositoryResult<Vec<Worker>> {
        self.with_conn(|conn| {
            let rows = workers::table
                .order(workers::id.asc())
                .select(WorkerRow::as_select())
                .load::<WorkerRow>(conn)
                .map_err(map_diesel_error)?;
            convert_all(rows)
        })
        .await
    }

    async fn workers_for_train(&self, train_id: TrainId) -> RepositoryResult<Vec<Worker>> {
        self.with_conn(move |conn| {
            let rows = workers::table
                .filter(workers::train_id.eq(train_id.value()))
                .order(workers::id.asc())
                .select(WorkerRow::as_select())
                .load::<WorkerRow>(conn)
                .map_err(map_diesel_error)?;
            convert_all(rows)
        })
        .await
    }

    async fn workers_in_window(&self, window: &TimeWindow) -> RepositoryResult<Vec<Worker>> {
        let window = *window;
        self.with_conn(move |conn| {
            let rows = workers::table
                .filter(workers::appearance_time.le(window.end()))
                .filter(
                    workers::disappearance_time
                        .is_null()
                        .or(workers::disappearance_time.ge(window.start())),
                )
                .order(workers::id.asc())
                .select(WorkerRow::as_select())
                .load::<WorkerRow>(conn)
                .map_err(map_diesel_error)?;
            convert_all(rows)
        })
        .await
    }

    async fn delete_worker(&self, worker_id: WorkerId) -> RepositoryResult<CascadeSummary> {
        self.with_transaction("delete_worker", move |conn| {
            let (activities, incidents) = count_owned_rows(conn, &[worker_id.value()])?;
            let deleted = diesel::delete(workers::table.find(worker_id.value()))
                .execute(conn)
                .map_err(map_diesel_error)?;
            if deleted == 0 {
                return Err(missing("worker", worker_id, "delete_worker"));
            }
            Ok(CascadeSummary {
                workers: 1,
                activities,
                incidents,
                snapshots: 0,
            })
        })
        .await
    }

    // ==================== Activity Records ====================

    async fn insert_activity(&self, record: &NewActivityRecord) -> RepositoryResult<ActivityRecord> {
        let span = normalize(record.span)?;
        let row = NewWorkerActivityRow {
            worker_id: record.worker_id.value(),
            activity_id: record.activity_kind_id.value(),
            start_time: span.start(),
            end_time: span.end(),
        };
        self.with_conn(move |conn| {
            diesel::insert_into(worker_activities::table)
                .values(&row)
                .returning(WorkerActivityRow::as_returning())
                .get_result::<WorkerActivityRow>(conn)
                .map_err(|e| map_diesel_error(e).with_operation("insert_activity"))?
                .try_into()
        })
        .await
    }

    async fn close_activity(
        &self,
        record_id: ActivityRecordId,
        ended_at: Timestamp,
    ) -> RepositoryResult<ActivityRecord> {
        let ended_at = to_seconds(ended_at);
        self.with_transaction("close_activity", move |conn| {
            let current: ActivityRecord = worker_activities::table
                .find(record_id.value())
                .select(WorkerActivityRow::as_select())
                .for_update()
                .first::<WorkerActivityRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .ok_or_else(|| missing("activity", record_id, "close_activity"))?
                .try_into()?;
            let span = current.span.close(ended_at)?;

            diesel::update(worker_activities::table.find(record_id.value()))
                .set(worker_activities::end_time.eq(span.end()))
                .returning(WorkerActivityRow::as_returning())
                .get_result::<WorkerActivityRow>(conn)
                .map_err(map_diesel_error)?
                .try_into()
        })
        .await
    }

    async fn activities_for_worker(&self, worker_id: WorkerId) -> RepositoryResult<Vec<ActivityRecord>> {
        self.with_conn(move |conn| {
            let rows = worker_activities::table
                .filter(worker_activities::worker_id.eq(worker_id.value()))
                .order(worker_activities::id.asc())
                .select(WorkerActivityRow::as_select())
                .load::<WorkerActivityRow>(conn)
                .map_err(map_diesel_error)?;
            convert_all(rows)
        })
        .await
    }

    async fn activities_of_kind(&self, kind_id: ActivityKindId) -> RepositoryResult<Vec<ActivityRecord>> {
        self.with_conn(move |conn| {
            let rows = worker_activities::table
                .filter(worker_activities::activity_id.eq(kind_id.value()))
                .order(worker_activities::id.asc())
                .select(WorkerActivityRow::as_select())
                .load::<WorkerActivityRow>(conn)
                .map_err(map_diesel_error)?;
            convert_all(rows)
        })
        .await
    }

    async fn activities_in_window(&self, window: &TimeWindow) -> RepositoryResult<Vec<ActivityRecord>> {
        let window = *window;
        self.with_conn(move |conn| {
            let rows = worker_activities::table
                .filter(worker_activities::start_time.le(window.end()))
                .filter(
                    worker_activities::end_time
                        .is_null()
                        .or(worker_activities::end_time.ge(window.start())),
                )
                .order(worker_activities::id.asc())
                .select(WorkerActivityRow::as_select())
                .load::<WorkerActivityRow>(conn)
                .map_err(map_diesel_error)?;
            convert_all(rows)
        })
        .await
    }

    // ==================== Snapshots ====================

    async fn insert_snapshot(&self, snapshot: &NewFrameSnapshot) -> RepositoryResult<FrameSnapshot> {
        if snapshot.worker_count < 0 {
            return Err(RepositoryError::validation(format!(
                "Snapshot worker count must not be negative, got {}",
                snapshot.worker_count
            )));
        }
        let row = NewFrameStatisticsRow {
            timestamp: to_seconds(snapshot.timestamp),
            workers_count: snapshot.worker_count,
            train_id: snapshot.train_id.value(),
        };
        self.with_conn(move |conn| {
            diesel::insert_into(frame_statistics::table)
                .values(&row)
                .returning(FrameStatisticsRow::as_returning())
                .get_result::<FrameStatisticsRow>(conn)
                .map(FrameSnapshot::from)
                .map_err(|e| map_diesel_error(e).with_operation("insert_snapshot"))
        })
        .await
    }

    async fn snapshots_in_window(&self, window: &TimeWindow) -> RepositoryResult<Vec<FrameSnapshot>> {
        let window = *window;
        self.with_conn(move |conn| {
            frame_statistics::table
                .filter(frame_statistics::timestamp.between(window.start(), window.end()))
                .order((frame_statistics::timestamp.asc(), frame_statistics::id.asc()))
                .select(FrameStatisticsRow::as_select())
                .load::<FrameStatisticsRow>(conn)
                .map(|rows| rows.into_iter().map(FrameSnapshot::from).collect())
                .map_err(map_diesel_error)
        })
        .await
    }

    // ==================== Incidents ====================

    async fn insert_incident(&self, incident: &NewIncident) -> RepositoryResult<Incident> {
        let row = NewAlertRow {
            worker_id: incident.worker_id.value(),
            alert_type: incident.incident_type.clone(),
            message: incident.message.clone(),
            occurred_at: to_seconds(incident.occurred_at),
        };
        self.with_conn(move |conn| {
            diesel::insert_into(alerts::table)
                .values(&row)
                .returning(AlertRow::as_returning())
                .get_result::<AlertRow>(conn)
                .map(Incident::from)
                .map_err(|e| map_diesel_error(e).with_operation("insert_incident"))
        })
        .await
    }

    async fn incidents_since(
        &self,
        since: Timestamp,
        incident_type: Option<&str>,
    ) -> RepositoryResult<Vec<Incident>> {
        let incident_type = incident_type.map(str::to_string);
        self.with_conn(move |conn| {
            let mut query = alerts::table
                .filter(alerts::occurred_at.ge(since))
                .into_boxed();
            if let Some(ref ty) = incident_type {
                query = query.filter(alerts::alert_type.eq(ty.clone()));
            }
            query
                .order((alerts::occurred_at.desc(), alerts::id.desc()))
                .select(AlertRow::as_select())
                .load::<AlertRow>(conn)
                .map(|rows| rows.into_iter().map(Incident::from).collect())
                .map_err(map_diesel_error)
        })
        .await
    }

    // ==================== Counts ====================

    async fn worker_counts_by_train(&self) -> RepositoryResult<Vec<TrainWorkerCount>> {
        self.with_conn(|conn| {
            let rows: Vec<(i64, String, i64)> = workers::table
                .inner_join(trains::table)
                .group_by((trains::id, trains::train_number))
                .select((trains::id, trains::train_number, count(workers::id)))
                .order(trains::id.asc())
                .load(conn)
                .map_err(map_diesel_error)?;
            Ok(rows
                .into_iter()
                .map(|(train_id, train_number, worker_count)| TrainWorkerCount {
                    train_id: TrainId(train_id),
                    train_number,
                    worker_count,
                })
                .collect())
        })
        .await
    }

    async fn safety_counts(&self) -> RepositoryResult<SafetyCounts> {
        self.with_conn(|conn| {
            let total: i64 = workers::table
                .count()
                .get_result(conn)
                .map_err(map_diesel_error)?;
            let flagged: i64 = workers::table
                .filter(workers::helmet_on.eq(true))
                .count()
                .get_result(conn)
                .map_err(map_diesel_error)?;
            Ok(SafetyCounts { total, flagged })
        })
        .await
    }
}

#[async_trait]
impl AnalyticsRepository for PostgresRepository {
    async fn recompute_mean_durations(
        &self,
        active_kind: ActivityKindId,
        now: Timestamp,
    ) -> RepositoryResult<Vec<MeanDuration>> {
        let now = to_seconds(now);
        let stored = self
            .with_transaction("recompute_mean_durations", move |conn| {
                let kind_exists = activities::table
                    .find(active_kind.value())
                    .select(activities::id)
                    .first::<i32>(conn)
                    .optional()
                    .map_err(map_diesel_error)?
                    .is_some();
                if !kind_exists {
                    return Err(missing(
                        "activity_kind",
                        active_kind,
                        "recompute_mean_durations",
                    ));
                }

                let uniforms: Vec<Uniform> = uniforms::table
                    .order(uniforms::id.asc())
                    .select(UniformRow::as_select())
                    .load::<UniformRow>(conn)
                    .map_err(map_diesel_error)?
                    .into_iter()
                    .map(Uniform::from)
                    .collect();
                let workers: Vec<Worker> = convert_all(
                    workers::table
                        .select(WorkerRow::as_select())
                        .load::<WorkerRow>(conn)
                        .map_err(map_diesel_error)?,
                )?;
                let records: Vec<ActivityRecord> = convert_all(
                    worker_activities::table
                        .filter(worker_activities::activity_id.eq(active_kind.value()))
                        .select(WorkerActivityRow::as_select())
                        .load::<WorkerActivityRow>(conn)
                        .map_err(map_diesel_error)?,
                )?;

                let rows: Vec<NewMeanWorkingTimeRow> =
                    compute_mean_durations(&uniforms, &workers, &records, active_kind)
                        .into_iter()
                        .map(|sample| NewMeanWorkingTimeRow {
                            uniform_id: sample.uniform_id.value(),
                            mean_seconds: sample.mean_seconds,
                            worker_count: sample.worker_count,
                            activity_count: sample.activity_count,
                            last_updated: now,
                        })
                        .collect();

                if !rows.is_empty() {
                    diesel::insert_into(mean_working_times::table)
                        .values(&rows)
                        .on_conflict(mean_working_times::uniform_id)
                        .do_update()
                        .set((
                            mean_working_times::mean_seconds
                                .eq(excluded(mean_working_times::mean_seconds)),
                            mean_working_times::worker_count
                                .eq(excluded(mean_working_times::worker_count)),
                            mean_working_times::activity_count
                                .eq(excluded(mean_working_times::activity_count)),
                            mean_working_times::last_updated
                                .eq(excluded(mean_working_times::last_updated)),
                        ))
                        .execute(conn)
                        .map_err(map_diesel_error)?;
                }

                mean_working_times::table
                    .order(mean_working_times::uniform_id.asc())
                    .select(MeanWorkingTimeRow::as_select())
                    .load::<MeanWorkingTimeRow>(conn)
                    .map(|rows| rows.into_iter().map(MeanDuration::from).collect::<Vec<_>>())
                    .map_err(map_diesel_error)
            })
            .await?;

        info!("Recomputed mean durations for {} uniforms", stored.len());
        Ok(stored)
    }

    async fn get_mean_duration(&self, uniform_id: UniformId) -> RepositoryResult<Option<MeanDuration>> {
        self.with_conn(move |conn| {
            mean_working_times::table
                .filter(mean_working_times::uniform_id.eq(uniform_id.value()))
                .select(MeanWorkingTimeRow::as_select())
                .first::<MeanWorkingTimeRow>(conn)
                .optional()
                .map(|row| row.map(MeanDuration::from))
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn list_mean_durations(&self) -> RepositoryResult<Vec<MeanDuration>> {
        self.with_conn(|conn| {
            mean_working_times::table
                .order(mean_working_times::uniform_id.asc())
                .select(MeanWorkingTimeRow::as_select())
                .load::<MeanWorkingTimeRow>(conn)
                .map(|rows| rows.into_iter().map(MeanDuration::from).collect())
                .map_err(map_diesel_error)
        })
        .await
    }
}

#[async_trait]
impl RetentionRepository for PostgresRepository {
    async fn record_counts(&self) -> RepositoryResult<RecordCounts> {
        self.with_conn(load_record_counts).await
    }

    async fn enforce_retention(&self, policy: &RetentionPolicy) -> RepositoryResult<RetentionReport> {
        let policy = *policy;
        let report = self
            .with_transaction("enforce_retention", move |conn| {
                let counts_before = load_record_counts(conn)?;
                if !policy.is_triggered(counts_before) {
                    return Ok(RetentionReport::untouched(counts_before));
                }
                let batch = policy.delete_batch as i64;

                let activity_ids: Vec<i64> = worker_activities::table
                    .order((worker_activities::start_time.asc(), worker_activities::id.asc()))
                    .limit(batch)
                    .select(worker_activities::id)
                    .load(conn)
                    .map_err(map_diesel_error)?;
                diesel::delete(
                    worker_activities::table.filter(worker_activities::id.eq_any(&activity_ids[..])),
                )
                .execute(conn)
                .map_err(map_diesel_error)?;

                let worker_ids: Vec<i64> = workers::table
                    .order((workers::appearance_time.asc(), workers::id.asc()))
                    .limit(batch)
                    .select(workers::id)
                    .load(conn)
                    .map_err(map_diesel_error)?;
                let (cascaded_activities, cascaded_incidents) =
                    count_owned_rows(conn, &worker_ids)?;
                diesel::delete(workers::table.filter(workers::id.eq_any(&worker_ids[..])))
                    .execute(conn)
                    .map_err(map_diesel_error)?;

                Ok(RetentionReport {
                    triggered: true,
                    counts_before,
                    counts_after: load_record_counts(conn)?,
                    evicted_activities: activity_ids.into_iter().map(ActivityRecordId).collect(),
                    evicted_workers: worker_ids.into_iter().map(WorkerId).collect(),
                    cascaded_activities,
                    cascaded_incidents,
                })
            })
            .await?;

        if report.triggered {
            warn!(
                "Retention evicted {} activities and {} workers ({:?} -> {:?})",
                report.evicted_activities.len(),
                report.evicted_workers.len(),
                report.counts_before,
                report.counts_after
            );
        } else {
            debug!("Retention below threshold, nothing evicted");
        }
        Ok(report)
    }
}
