//! Shared helpers for the integration tests: a scoped environment guard and
//! depot fixtures backed by `LocalRepository`.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{Duration, TimeZone, Utc};

use depot_analytics::db::repositories::LocalRepository;
use depot_analytics::db::DepotRepository;
use depot_analytics::models::{
    ActivityKind, ActivityRecord, Interval, NewActivityRecord, NewFrameSnapshot, NewIncident,
    NewTrain, NewWorker, Timestamp, Train, TrainId, Uniform, UniformId, Worker,
};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// This is panic-safe (restores variables on unwind) and also serializes access to
/// process-global env vars to avoid flaky tests when Rust runs tests in parallel.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().expect("ENV_LOCK poisoned");
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

/// Minutes after the fixture epoch, 2024-03-01 08:00 UTC.
pub fn at(minutes: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + Duration::minutes(minutes)
}

fn span(start: i64, end: Option<i64>) -> Interval {
    Interval::new(at(start), end.map(at)).unwrap()
}

/// A store with one train, two uniforms and two activity kinds.
pub struct Depot {
    pub repo: LocalRepository,
    pub train: Train,
    pub orange: Uniform,
    pub blue: Uniform,
    pub active: ActivityKind,
    pub idle: ActivityKind,
}

pub async fn seeded_depot() -> Depot {
    let repo = LocalRepository::new();
    let train = add_train(&repo, "101-202", 0, None).await;
    let orange = repo.insert_uniform("orange").await.unwrap();
    let blue = repo.insert_uniform("blue").await.unwrap();
    let active = repo
        .insert_activity_kind("active", Some("Hands-on repair work"))
        .await
        .unwrap();
    let idle = repo.insert_activity_kind("idle", None).await.unwrap();
    Depot {
        repo,
        train,
        orange,
        blue,
        active,
        idle,
    }
}

pub async fn add_train(repo: &LocalRepository, number: &str, start: i64, end: Option<i64>) -> Train {
    repo.insert_train(&NewTrain {
        number: number.to_string(),
        stay: span(start, end),
    })
    .await
    .unwrap()
}

pub async fn add_worker(
    repo: &LocalRepository,
    train_id: TrainId,
    uniform_id: UniformId,
    helmet_on: bool,
    start: i64,
    end: Option<i64>,
) -> Worker {
    repo.insert_worker(&NewWorker {
        train_id,
        uniform_id,
        helmet_on,
        presence: span(start, end),
    })
    .await
    .unwrap()
}

pub async fn add_activity(
    repo: &LocalRepository,
    worker: &Worker,
    kind: &ActivityKind,
    start: i64,
    end: Option<i64>,
) -> ActivityRecord {
    repo.insert_activity(&NewActivityRecord {
        worker_id: worker.id,
        activity_kind_id: kind.id,
        span: span(start, end),
    })
    .await
    .unwrap()
}

pub async fn add_snapshot(repo: &LocalRepository, train_id: TrainId, minute: i64, count: i32) {
    repo.insert_snapshot(&NewFrameSnapshot {
        timestamp: at(minute),
        worker_count: count,
        train_id,
    })
    .await
    .unwrap();
}

pub async fn add_incident(repo: &LocalRepository, worker: &Worker, kind: &str, minute: i64) {
    repo.insert_incident(&NewIncident {
        worker_id: worker.id,
        incident_type: kind.to_string(),
        message: format!("{} detected", kind),
        occurred_at: at(minute),
    })
    .await
    .unwrap();
}
