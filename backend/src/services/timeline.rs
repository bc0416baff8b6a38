//! Timeline views joining interval records with their reference data.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::{
    ActivityKind, ActivityKindId, ActivityRecord, ActivityRecordId, Interval, TimeWindow,
    Uniform, UniformId, Worker, WorkerId,
};
use crate::services::overlap::{filter_overlapping, sort_chronologically};

/// One worker on a train's presence chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub worker_id: WorkerId,
    pub uniform_label: Option<String>,
    pub helmet_on: bool,
    pub presence: Interval,
}

/// One activity record on a worker's timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTimelineEntry {
    pub record_id: ActivityRecordId,
    pub activity_name: Option<String>,
    pub description: Option<String>,
    pub span: Interval,
}

/// Workers overlapping `window`, by appearance time, labelled with their uniform.
pub fn presence_timeline(
    workers: Vec<Worker>,
    uniforms: &[Uniform],
    window: &TimeWindow,
) -> Vec<PresenceEntry> {
    let labels: HashMap<UniformId, &str> =
        uniforms.iter().map(|u| (u.id, u.label.as_str())).collect();

    let mut present = filter_overlapping(workers, window);
    sort_chronologically(&mut present);

    present
        .into_iter()
        .map(|w| PresenceEntry {
            worker_id: w.id,
            uniform_label: labels.get(&w.uniform_id).map(|l| l.to_string()),
            helmet_on: w.helmet_on,
            presence: w.presence,
        })
        .collect()
}

/// A worker's activity records by start time, with kind name and description.
pub fn activity_timeline(
    mut records: Vec<ActivityRecord>,
    kinds: &[ActivityKind],
) -> Vec<ActivityTimelineEntry> {
    let by_id: HashMap<ActivityKindId, &ActivityKind> = kinds.iter().map(|k| (k.id, k)).collect();
    sort_chronologically(&mut records);

    records
        .into_iter()
        .map(|r| {
            let kind = by_id.get(&r.activity_kind_id);
            ActivityTimelineEntry {
                record_id: r.id,
                activity_name: kind.map(|k| k.name.clone()),
                description: kind.and_then(|k| k.description.clone()),
                span: r.span,
            }
        })
        .collect()
}

/// Workers that had an activity whose kind name contains `pattern`
/// (case-insensitive) overlapping `window`, ordered by worker id.
///
/// `workers` is expected to be pre-filtered to the trains of interest.
pub fn workers_with_matching_activity(
    workers: &[Worker],
    activities: &[ActivityRecord],
    kinds: &[ActivityKind],
    pattern: &str,
    window: &TimeWindow,
) -> Vec<Worker> {
    let needle = pattern.to_lowercase();
    let matching_kinds: BTreeSet<ActivityKindId> = kinds
        .iter()
        .filter(|k| k.name.to_lowercase().contains(&needle))
        .map(|k| k.id)
        .collect();

    let active_workers: BTreeSet<WorkerId> = activities
        .iter()
        .filter(|a| matching_kinds.contains(&a.activity_kind_id))
        .filter(|a| a.span.overlaps(window))
        .map(|a| a.worker_id)
        .collect();

    let mut matched: Vec<Worker> = workers
        .iter()
        .filter(|w| active_workers.contains(&w.id))
        .cloned()
        .collect();
    matched.sort_by_key(|w| w.id);
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Timestamp, TrainId};
    use chrono::{TimeZone, Utc};

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn kind(id: i32, name: &str) -> ActivityKind {
        ActivityKind {
            id: ActivityKindId(id),
            name: name.to_string(),
            description: Some(format!("{} description", name)),
        }
    }

    fn worker(id: i64, uniform: i32, start: i64, end: Option<i64>) -> Worker {
        Worker {
            id: WorkerId(id),
            train_id: TrainId(1),
            uniform_id: UniformId(uniform),
            helmet_on: id % 2 == 0,
            presence: Interval::new(t(start), end.map(t)).unwrap(),
        }
    }

    fn record(id: i64, worker: i64, kind: i32, start: i64, end: Option<i64>) -> ActivityRecord {
        ActivityRecord {
            id: ActivityRecordId(id),
            worker_id: WorkerId(worker),
            activity_kind_id: ActivityKindId(kind),
            span: Interval::new(t(start), end.map(t)).unwrap(),
        }
    }

    #[test]
    fn test_presence_timeline_filters_and_labels() {
        let uniforms = vec![Uniform {
            id: UniformId(1),
            label: "blue".to_string(),
        }];
        let workers = vec![
            worker(1, 1, 50, None),
            worker(2, 9, 10, Some(20)),
            worker(3, 1, 0, Some(5)),
        ];
        let window = TimeWindow::new(t(10), t(100)).unwrap();

        let entries = presence_timeline(workers, &uniforms, &window);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].worker_id, WorkerId(2));
        assert_eq!(entries[0].uniform_label, None);
        assert_eq!(entries[1].worker_id, WorkerId(1));
        assert_eq!(entries[1].uniform_label.as_deref(), Some("blue"));
    }

    #[test]
    fn test_activity_timeline_chronological() {
        let kinds = vec![kind(1, "repairing"), kind(2, "idle")];
        let records = vec![record(1, 1, 2, 100, None), record(2, 1, 1, 0, Some(50))];

        let entries = activity_timeline(records, &kinds);
        assert_eq!(entries[0].activity_name.as_deref(), Some("repairing"));
        assert_eq!(entries[1].activity_name.as_deref(), Some("idle"));
        assert!(entries[1].span.is_open());
    }

    #[test]
    fn test_workers_with_matching_activity() {
        let kinds = vec![kind(1, "Repairing brakes"), kind(2, "idle")];
        let workers = vec![worker(1, 1, 0, None), worker(2, 1, 0, None), worker(3, 1, 0, None)];
        let activities = vec![
            record(1, 1, 1, 0, Some(10)),
            record(2, 2, 2, 0, Some(100)),
            record(3, 3, 1, 40, None),
            record(4, 1, 1, 60, Some(70)),
        ];
        let window = TimeWindow::new(t(20), t(50)).unwrap();

        let matched = workers_with_matching_activity(&workers, &activities, &kinds, "repair", &window);
        let ids: Vec<i64> = matched.iter().map(|w| w.id.value()).collect();
        assert_eq!(ids, vec![3]);
    }
}
