pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use services::proxy::ProxyService;
use services::upstream::{HttpUpstream, Upstream};

/// Shared application state passed to all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub proxy: ProxyService,
    pub config: config::AppConfig,
}

impl AppState {
    /// State backed by a reqwest client for the configured upstream.
    pub fn from_config(config: config::AppConfig) -> Result<Self, reqwest::Error> {
        let upstream = HttpUpstream::from_config(&config)?;
        Ok(Self::with_upstream(config, Arc::new(upstream)))
    }

    pub fn with_upstream(config: config::AppConfig, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            proxy: ProxyService::new(upstream, config.bounty_paging),
            config,
        }
    }
}
