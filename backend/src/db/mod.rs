//! Interval store for depot data.
//!
//! This module provides abstractions for store operations via the Repository
//! pattern, so the analytics work the same against every backend.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Application Layer (REST API, maintenance loop)         │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Service Layer (services.rs)                            │
//! │  - Window validation                                    │
//! │  - Feeding the analytics engines                        │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Repository Traits (repository/)                        │
//! └───────────────────┬─────────────────────────────────────┘
//!     ┌───────────────┴────────────────┐
//! ┌───▼──────────────┐     ┌───────────▼─────────────┐
//! │ Postgres (Diesel)│     │ Local (in-memory)       │
//! └──────────────────┘     └─────────────────────────┘
//! ```
//!
//! # Recommended Usage
//!
//! ```ignore
//! use depot_analytics::db::{services, RepositoryFactory, RepositoryType};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let repo = RepositoryFactory::create(RepositoryType::Local, None).await?;
//!     let busiest = services::busiest_trains(repo.as_ref(), 5).await?;
//!     Ok(())
//! }
//! ```

#[cfg(not(any(feature = "postgres-repo", feature = "local-repo")))]
compile_error!("Enable at least one repository backend feature.");

pub mod factory;
pub mod repo_config;
pub mod repositories;
pub mod repository;
pub mod services;

// Postgres config is colocated with the repository implementation.
#[cfg(feature = "postgres-repo")]
pub use repositories::postgres::PostgresConfig;
#[cfg(not(feature = "postgres-repo"))]
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    _private: (),
}

pub use services::{
    busiest_trains, enforce_retention, health_check, mean_duration, overlaps, peak_periods,
    recent_incidents, recompute_all_mean_durations, run_maintenance_cycle,
    safety_usage_percentage, MaintenanceReport,
};

pub use repo_config::RepositoryConfig;

pub use factory::{RepositoryFactory, RepositoryType};
pub use repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
pub use repositories::PostgresRepository;
pub use repository::{
    AnalyticsRepository, DepotRepository, ErrorContext, FullRepository, RepositoryError,
    RepositoryResult, RetentionRepository,
};

use anyhow::{Context, Result};
use std::sync::Arc;

/// Build the repository selected by `config` and confirm it is reachable.
pub async fn init_repository(config: &RepositoryConfig) -> Result<Arc<dyn FullRepository>> {
    let repo = RepositoryFactory::from_repository_config(config)
        .await
        .context("Failed to create repository")?;
    let healthy = repo
        .health_check()
        .await
        .context("Repository health check failed")?;
    if !healthy {
        anyhow::bail!("Repository reported unhealthy after initialization");
    }
    Ok(repo)
}
