//! Retention repository trait for the bounded worker and activity tables.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::RecordCounts;
use crate::services::retention::{RetentionPolicy, RetentionReport};

/// Repository trait for retention enforcement.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait RetentionRepository: Send + Sync {
    /// Live row counts of workers and activity records.
    async fn record_counts(&self) -> RepositoryResult<RecordCounts>;

    /// Run one retention cycle.
    ///
    /// When triggered, evicts the `delete_batch` oldest activity records and
    /// then the `delete_batch` oldest workers in a single atomic write. A
    /// failure rolls back the whole cycle and is returned, never retried.
    async fn enforce_retention(&self, policy: &RetentionPolicy)
        -> RepositoryResult<RetentionReport>;
}
