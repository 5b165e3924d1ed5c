use std::env;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use crate::errors::ConfigError;
use crate::models::pagination::PagingPolicy;

const DEFAULT_UPSTREAM_API_URL: &str = "https://zeroauthoritydao.com/api";
const DEFAULT_USER_AGENT: &str = "Dashboard-Proxy/1.0";
const DEFAULT_PROXY_URL: &str = "http://127.0.0.1:5000/proxy";

/// Proxy configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub upstream_base_url: Url,
    /// `None` leaves the transport default in place.
    pub upstream_timeout: Option<Duration>,
    pub upstream_user_agent: String,
    pub bounty_paging: PagingPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let upstream_base_url = parse_url(
            "UPSTREAM_API_URL",
            &env::var("UPSTREAM_API_URL").unwrap_or_else(|_| DEFAULT_UPSTREAM_API_URL.to_string()),
        )?;

        Ok(Self {
            host: env::var("BACKEND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parsed_var("BACKEND_PORT", 5000),
            upstream_base_url,
            upstream_timeout: env::var("UPSTREAM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            upstream_user_agent: env::var("UPSTREAM_USER_AGENT")
                .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
            bounty_paging: PagingPolicy::new(
                parsed_var("BOUNTY_PAGE_LIMIT", PagingPolicy::DEFAULT_PAGE_LIMIT),
                parsed_var("BOUNTY_MAX_PAGES", PagingPolicy::DEFAULT_MAX_PAGES),
            ),
        })
    }

    /// Configuration pointing at an explicit upstream, with defaults everywhere else.
    pub fn for_upstream(upstream_base_url: Url) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            upstream_base_url,
            upstream_timeout: None,
            upstream_user_agent: DEFAULT_USER_AGENT.to_string(),
            bounty_paging: PagingPolicy::default(),
        }
    }
}

/// Dashboard binary configuration.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub proxy_url: Url,
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            proxy_url: parse_url(
                "DASHBOARD_PROXY_URL",
                &env::var("DASHBOARD_PROXY_URL").unwrap_or_else(|_| DEFAULT_PROXY_URL.to_string()),
            )?,
        })
    }
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        var,
        reason: e.to_string(),
    })
}
