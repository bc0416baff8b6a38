//! Derived statistics over the stored interval records.
//!
//! Every function here is a pure function of its inputs: no store access, no
//! clock. Empty inputs produce empty or zero results.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::{
    ActivityKindId, ActivityRecord, FrameSnapshot, SafetyCounts, TrainWorkerCount, Uniform,
    UniformId, Worker, WorkerId,
};

/// Freshly computed mean duration for one uniform, before it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanDurationSample {
    pub uniform_id: UniformId,
    pub mean_seconds: f64,
    pub worker_count: i64,
    pub activity_count: i64,
}

/// Total time spent on one activity kind by workers wearing a uniform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniformActivityTime {
    pub uniform_id: UniformId,
    pub uniform_label: String,
    pub total_seconds: i64,
    pub activity_count: i64,
}

#[derive(Default)]
struct DurationAccumulator {
    total_seconds: i64,
    records: i64,
    workers: BTreeSet<WorkerId>,
}

/// Sum closed-record durations of `kind` per uniform.
///
/// Records whose end is absent contribute nothing: an activity that is still
/// running has no duration yet. Records of workers missing from `workers` are
/// skipped.
fn accumulate_by_uniform(
    workers: &[Worker],
    activities: &[ActivityRecord],
    kind: ActivityKindId,
) -> HashMap<UniformId, DurationAccumulator> {
    let uniform_of: HashMap<WorkerId, UniformId> =
        workers.iter().map(|w| (w.id, w.uniform_id)).collect();

    let mut per_uniform: HashMap<UniformId, DurationAccumulator> = HashMap::new();
    for record in activities.iter().filter(|a| a.activity_kind_id == kind) {
        let Some(duration) = record.span.duration() else {
            continue;
        };
        let Some(&uniform_id) = uniform_of.get(&record.worker_id) else {
            continue;
        };

        let acc = per_uniform.entry(uniform_id).or_default();
        acc.total_seconds = acc.total_seconds.saturating_add(duration.num_seconds());
        acc.records += 1;
        acc.workers.insert(record.worker_id);
    }
    per_uniform
}

/// Mean duration of the active activity kind for every uniform.
///
/// Produces one sample per uniform, ordered by uniform id. A uniform with no
/// contributing records gets a mean of 0 and zero counts.
pub fn compute_mean_durations(
    uniforms: &[Uniform],
    workers: &[Worker],
    activities: &[ActivityRecord],
    active_kind: ActivityKindId,
) -> Vec<MeanDurationSample> {
    let per_uniform = accumulate_by_uniform(workers, activities, active_kind);

    let mut uniform_ids: Vec<UniformId> = uniforms.iter().map(|u| u.id).collect();
    uniform_ids.sort();
    uniform_ids.dedup();

    uniform_ids
        .into_iter()
        .map(|uniform_id| match per_uniform.get(&uniform_id) {
            Some(acc) if acc.records > 0 => MeanDurationSample {
                uniform_id,
                mean_seconds: acc.total_seconds as f64 / acc.records as f64,
                worker_count: acc.workers.len() as i64,
                activity_count: acc.records,
            },
            _ => MeanDurationSample {
                uniform_id,
                mean_seconds: 0.0,
                worker_count: 0,
                activity_count: 0,
            },
        })
        .collect()
}

/// Share of workers wearing a helmet, in percent. Zero when there are no workers.
pub fn safety_usage_percentage(counts: SafetyCounts) -> f64 {
    if counts.total <= 0 {
        return 0.0;
    }
    100.0 * counts.flagged as f64 / counts.total as f64
}

/// Trains ordered by worker count, busiest first.
///
/// Ties keep train id order. At most `limit` entries are returned.
pub fn rank_busiest(mut counts: Vec<TrainWorkerCount>, limit: usize) -> Vec<TrainWorkerCount> {
    counts.sort_by_key(|c| c.train_id);
    counts.sort_by_key(|c| Reverse(c.worker_count));
    counts.truncate(limit);
    counts
}

/// Snapshots with at least `min_workers` people in frame, most crowded first.
///
/// Ties keep chronological order.
pub fn peak_periods(mut snapshots: Vec<FrameSnapshot>, min_workers: i32) -> Vec<FrameSnapshot> {
    snapshots.retain(|s| s.worker_count >= min_workers);
    snapshots.sort_by_key(|s| (s.timestamp, s.id));
    snapshots.sort_by_key(|s| Reverse(s.worker_count));
    snapshots
}

/// Total closed-record time of `kind` per uniform, ordered by uniform label.
///
/// Uniforms without any contributing record are left out.
pub fn activity_time_by_uniform(
    uniforms: &[Uniform],
    workers: &[Worker],
    activities: &[ActivityRecord],
    kind: ActivityKindId,
) -> Vec<UniformActivityTime> {
    let per_uniform = accumulate_by_uniform(workers, activities, kind);

    let mut totals: Vec<UniformActivityTime> = uniforms
        .iter()
        .filter_map(|u| {
            per_uniform.get(&u.id).map(|acc| UniformActivityTime {
                uniform_id: u.id,
                uniform_label: u.label.clone(),
                total_seconds: acc.total_seconds,
                activity_count: acc.records,
            })
        })
        .collect();
    totals.sort_by(|a, b| a.uniform_label.cmp(&b.uniform_label));
    totals
}
