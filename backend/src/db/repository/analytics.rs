//! Analytics repository trait for the materialized mean durations.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{ActivityKindId, MeanDuration, Timestamp, UniformId};

/// Repository trait for the mean-duration aggregate.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    /// Recompute the mean duration of `active_kind` for every uniform and
    /// upsert the results keyed by uniform, stamping `now`.
    ///
    /// The whole recompute is one atomic write: either every row is
    /// updated or none is.
    ///
    /// # Returns
    /// * `Ok(Vec<MeanDuration>)` - The stored rows, ordered by uniform id
    /// * `Err(RepositoryError)` - If the operation fails
    async fn recompute_mean_durations(
        &self,
        active_kind: ActivityKindId,
        now: Timestamp,
    ) -> RepositoryResult<Vec<MeanDuration>>;

    /// Fetch the stored aggregate for one uniform.
    ///
    /// # Returns
    /// * `Ok(None)` - If the aggregate was never computed
    async fn get_mean_duration(&self, uniform_id: UniformId)
        -> RepositoryResult<Option<MeanDuration>>;

    /// All stored aggregates, ordered by uniform id.
    async fn list_mean_durations(&self) -> RepositoryResult<Vec<MeanDuration>>;
}
