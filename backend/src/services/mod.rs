//! Analytics engines.
//!
//! Pure computations over interval records. Nothing in here talks to a store
//! or reads the clock; `db::services` feeds these functions with data loaded
//! from a repository.

pub mod aggregation;
pub mod concurrency;
pub mod overlap;
pub mod recency;
pub mod retention;
pub mod timeline;


pub use aggregation::{MeanDurationSample, UniformActivityTime};
pub use concurrency::{ConcurrencyPeak, PeakSpan};
pub use overlap::{OverlapEntity, OverlapRecord};
pub use retention::{EvictionPlan, RetentionError, RetentionPolicy, RetentionReport};
pub use timeline::{ActivityTimelineEntry, PresenceEntry};
