//! Error taxonomy and the uniform JSON error envelope returned by the proxy.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::models::resource::ResourceKind;

/// Failure talking to the upstream API (or to the proxy, from the dashboard's side).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// Transport-level failure: DNS, connection refused, timeout.
    #[error("Upstream unreachable: {0}")]
    Unreachable(String),

    /// The upstream answered with a non-2xx status.
    #[error("HTTP error! status: {status}")]
    Http { status: u16 },

    /// The upstream answered 2xx but the body was not valid JSON.
    #[error("Invalid upstream body: {0}")]
    Decode(String),
}

/// Body sent to proxy callers whenever an operation fails.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub details: String,
}

/// Proxy-boundary error type mapping to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}: {source}")]
    Upstream {
        message: String,
        #[source]
        source: UpstreamError,
    },

    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Wrap an upstream failure with the caller-facing message for its resource.
    pub fn upstream(message: impl Into<String>, source: UpstreamError) -> Self {
        Self::Upstream {
            message: message.into(),
            source,
        }
    }

    /// Check if this error came from the upstream dependency.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream { .. })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, envelope) = match &self {
            AppError::Upstream { message, source } => {
                tracing::error!(error = %source, "{message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorEnvelope {
                        error: message.clone(),
                        details: source.to_string(),
                    },
                )
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorEnvelope {
                    error: "Invalid request".to_string(),
                    details: msg.clone(),
                },
            ),
        };

        (status, Json(envelope)).into_response()
    }
}

/// A resource query failed. Carried inside shared query state, hence `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to fetch {}", .resource.label())]
pub struct QueryError {
    pub resource: ResourceKind,
    #[source]
    pub source: UpstreamError,
}

impl QueryError {
    pub fn new(resource: ResourceKind, source: UpstreamError) -> Self {
        Self { resource, source }
    }
}

/// Invalid environment configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid URL in {var}: {reason}")]
    InvalidUrl { var: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn upstream_error_becomes_500_envelope() {
        let err = AppError::upstream("Failed to fetch bounties", UpstreamError::Http { status: 503 });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "Failed to fetch bounties");
        assert_eq!(json["details"], "HTTP error! status: 503");
    }

    #[tokio::test]
    async fn validation_error_is_400() {
        let response = AppError::Validation("bad path".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["details"], "bad path");
    }

    #[test]
    fn upstream_error_display() {
        let err = UpstreamError::Http { status: 404 };
        assert_eq!(err.to_string(), "HTTP error! status: 404");
        assert_eq!(
            UpstreamError::Decode("eof".to_string()).to_string(),
            "Invalid upstream body: eof"
        );
    }

    #[test]
    fn query_error_display_names_resource() {
        let err = QueryError::new(
            ResourceKind::UserStats,
            UpstreamError::Unreachable("connection refused".to_string()),
        );
        assert_eq!(err.to_string(), "Failed to fetch user statistics");
    }

    #[test]
    fn app_error_is_upstream() {
        let err = AppError::upstream("x", UpstreamError::Decode("y".to_string()));
        assert!(err.is_upstream());
        assert!(!AppError::Validation("z".to_string()).is_upstream());
    }
}
