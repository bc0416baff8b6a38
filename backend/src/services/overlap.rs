//! Interval overlap lookups.
//!
//! Every record family with a start and an optional end goes through the same
//! predicate, [`Interval::overlaps`]. Open intervals count as still running,
//! so they match any window that ends at or after their start.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{ActivityRecord, HasInterval, TimeWindow, Train, Worker};

/// Record family an overlap query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapEntity {
    Train,
    Worker,
    Activity,
}

impl FromStr for OverlapEntity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "train" | "trains" | "vehicle" | "vehicles" => Ok(Self::Train),
            "worker" | "workers" => Ok(Self::Worker),
            "activity" | "activities" => Ok(Self::Activity),
            _ => Err(format!("Unknown interval entity: {}", s)),
        }
    }
}

/// One record returned by an overlap query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "record", rename_all = "snake_case")]
pub enum OverlapRecord {
    Train(Train),
    Worker(Worker),
    Activity(ActivityRecord),
}

impl HasInterval for OverlapRecord {
    fn interval(&self) -> crate::models::Interval {
        match self {
            OverlapRecord::Train(t) => t.interval(),
            OverlapRecord::Worker(w) => w.interval(),
            OverlapRecord::Activity(a) => a.interval(),
        }
    }

    fn record_id(&self) -> i64 {
        match self {
            OverlapRecord::Train(t) => t.record_id(),
            OverlapRecord::Worker(w) => w.record_id(),
            OverlapRecord::Activity(a) => a.record_id(),
        }
    }
}

/// Keep the items whose interval intersects `window`, in input order.
pub fn filter_overlapping<T, I>(items: I, window: &TimeWindow) -> Vec<T>
where
    T: HasInterval,
    I: IntoIterator<Item = T>,
{
    items
        .into_iter()
        .filter(|item| item.interval().overlaps(window))
        .collect()
}

/// Order by start time, then by id.
pub fn sort_chronologically<T: HasInterval>(items: &mut [T]) {
    items.sort_by_key(|item| (item.interval().start(), item.record_id()));
}
