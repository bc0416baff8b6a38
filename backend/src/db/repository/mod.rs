//! Repository trait definitions for the interval store.
//!
//! The store is split across focused traits:
//!
//! - [`error`]: Error types for repository operations
//! - [`depot`]: Trains, workers, activity records, snapshots and incidents
//! - [`analytics`]: The materialized mean-duration aggregate
//! - [`retention`]: Record counts and eviction cycles
//!
//! For functions that need all repository capabilities, use the
//! [`FullRepository`] trait bound:
//!
//! ```ignore
//! async fn my_service<R: FullRepository>(repo: &R) -> RepositoryResult<()> {
//!     let counts = repo.record_counts().await?;
//!     repo.enforce_retention(&RetentionPolicy::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod analytics;
pub mod depot;
pub mod error;
pub mod retention;

pub use error::{ErrorContext, RepositoryError, RepositoryResult};

pub use analytics::AnalyticsRepository;
pub use depot::DepotRepository;
pub use retention::RetentionRepository;

/// Composite trait bound for a complete repository implementation.
///
/// Automatically implemented for any type that implements all three
/// repository traits.
pub trait FullRepository: DepotRepository + AnalyticsRepository + RetentionRepository {}

impl<T> FullRepository for T where T: DepotRepository + AnalyticsRepository + RetentionRepository {}
