//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::config::Config;
use crate::db::sqlite::SqliteStore;
use crate::services::catalog::ModelCache;
use crate::upstream::UpstreamClient;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Users, login sessions, and chat documents.
    pub store: Arc<SqliteStore>,
    /// Client for the upstream chat-completion API.
    pub upstream: UpstreamClient,
    /// In-memory copy of the reshaped model catalog.
    pub models: Arc<ModelCache>,
}

impl AppState {
    pub fn new(config: Config, store: SqliteStore) -> Self {
        let upstream = UpstreamClient::from_config(&config);
        let models = ModelCache::new(config.models_cache_ttl);
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            upstream,
            models: Arc::new(models),
        }
    }
}
