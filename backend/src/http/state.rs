//! Application state for the HTTP server.

use std::sync::Arc;

use crate::db::repo_config::{AnalyticsSettings, RepositoryConfig};
use crate::db::repository::FullRepository;
use crate::services::retention::RetentionPolicy;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Repository instance for store operations
    pub repository: Arc<dyn FullRepository>,
    /// Retention and analytics settings the handlers run with
    pub config: Arc<RepositoryConfig>,
}

impl AppState {
    /// Create a new application state with default settings.
    pub fn new(repository: Arc<dyn FullRepository>) -> Self {
        Self::with_config(repository, RepositoryConfig::default())
    }

    pub fn with_config(repository: Arc<dyn FullRepository>, config: RepositoryConfig) -> Self {
        Self {
            repository,
            config: Arc::new(config),
        }
    }

    pub fn retention_policy(&self) -> &RetentionPolicy {
        &self.config.retention
    }

    pub fn analytics(&self) -> &AnalyticsSettings {
        &self.config.analytics
    }
}
