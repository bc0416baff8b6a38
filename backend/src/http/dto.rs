//! Data Transfer Objects for the HTTP API.
//!
//! Query strings are parsed into these types; response bodies reuse the
//! domain and service types directly since they already derive `Serialize`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::db::services::MaintenanceReport;
pub use crate::models::{FrameSnapshot, Incident, MeanDuration, TrainWorkerCount, Worker};
pub use crate::services::{
    ActivityTimelineEntry, ConcurrencyPeak, OverlapRecord, PresenceEntry, RetentionReport,
    UniformActivityTime,
};

pub const DEFAULT_BUSIEST_LIMIT: usize = 10;
pub const DEFAULT_LOOKBACK_HOURS: i64 = 24;
pub const DEFAULT_PEAK_MIN_WORKERS: i32 = 5;
pub const DEFAULT_INCIDENT_MINUTES: i64 = 60;

/// Explicit `[start, end]` window, both RFC 3339.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// `chronological` sorts by start time instead of id
    #[serde(default)]
    pub order: Option<String>,
}

impl WindowQuery {
    pub fn chronological(&self) -> bool {
        self.order
            .as_deref()
            .is_some_and(|o| o.eq_ignore_ascii_case("chronological"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LimitQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Trailing window ending now.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HoursQuery {
    #[serde(default)]
    pub hours: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PeakPeriodsQuery {
    #[serde(default)]
    pub min_workers: Option<i32>,
    #[serde(default)]
    pub hours: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainActivityQuery {
    pub activity: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityNameQuery {
    pub activity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecentIncidentsQuery {
    #[serde(default)]
    pub minutes: Option<i64>,
    #[serde(default, rename = "type")]
    pub incident_type: Option<String>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the service
    pub status: String,
    /// Version of the API
    pub version: String,
    /// Store connection status
    pub database: String,
}

/// Helmet usage over all recorded workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelmetUsageResponse {
    pub percentage: f64,
}

/// Generic list wrapper with its length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        let total = items.len();
        Self { items, total }
    }
}

/// Peak concurrency inside a window; `peak` is absent when nobody was present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyResponse {
    pub peak: Option<ConcurrencyPeak>,
}
