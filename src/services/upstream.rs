//! Upstream client: one HTTP call to one resource path.
//!
//! The client owns transport details only: URL construction, headers, HTTP
//! status mapping and JSON decoding. It performs no retries and holds no
//! state beyond the connection pool, so it is safe to share across tasks.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::Value;

use crate::config::AppConfig;
use crate::errors::UpstreamError;

/// A request against the upstream, relative to its base address.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl UpstreamRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    /// First value of a query parameter.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A successful (2xx) upstream answer.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub body: Value,
}

/// Anything that can answer upstream requests.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Issue the request. Non-2xx answers fail with [`UpstreamError::Http`].
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamReply, UpstreamError>;

    /// GET `path` with optional query parameters and return the decoded body.
    async fn fetch(&self, path: &str, query: &[(String, String)]) -> Result<Value, UpstreamError> {
        let reply = self
            .send(UpstreamRequest::get(path).with_query(query.to_vec()))
            .await?;
        Ok(reply.body)
    }
}

/// Reqwest-backed upstream client.
pub struct HttpUpstream {
    client: Client,
    base_url: Url,
    user_agent: String,
}

impl HttpUpstream {
    /// Build a client. `timeout` of `None` keeps the transport default.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(
        base_url: Url,
        timeout: Option<Duration>,
        user_agent: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url,
            user_agent: user_agent.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, reqwest::Error> {
        Self::new(
            config.upstream_base_url.clone(),
            config.upstream_timeout,
            config.upstream_user_agent.clone(),
        )
    }

    fn url_for(&self, path: &str, query: &[(String, String)]) -> Result<Url, UpstreamError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                UpstreamError::Unreachable(format!(
                    "base address {} cannot carry a path",
                    self.base_url
                ))
            })?;
            segments.pop_if_empty();
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamReply, UpstreamError> {
        let url = self.url_for(&request.path, &request.query)?;
        tracing::debug!(method = %request.method, url = %url, "Calling upstream");

        let mut builder = self
            .client
            .request(request.method, url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, self.user_agent.as_str());
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(UpstreamError::Http {
                status: status.as_u16(),
            });
        }

        Ok(UpstreamReply {
            status,
            body: decode_body(&body)?,
        })
    }
}

fn map_transport_error(error: reqwest::Error) -> UpstreamError {
    UpstreamError::Unreachable(error.to_string())
}

/// An empty 2xx body decodes to JSON `null`.
fn decode_body(body: &[u8]) -> Result<Value, UpstreamError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
        .map_err(|e| UpstreamError::Decode(format!("invalid JSON payload: {e}")))
}


#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> HttpUpstream {
        HttpUpstream::new(Url::parse(base).unwrap(), None, "test-agent").unwrap()
    }

    #[test]
    fn url_joins_path_onto_base() {
        let c = client("https://example.test/api");
        let url = c.url_for("bounties/categories", &[]).unwrap();
        assert_eq!(url.as_str(), "https://example.test/api/bounties/categories");
    }

    #[test]
    fn url_tolerates_trailing_and_leading_slashes() {
        let c = client("https://example.test/api/");
        let url = c.url_for("/users/stats/", &[]).unwrap();
        assert_eq!(url.as_str(), "https://example.test/api/users/stats");
    }

    #[test]
    fn url_appends_query_pairs() {
        let c = client("https://example.test/api");
        let query = vec![
            ("limit".to_string(), "100".to_string()),
            ("page".to_string(), "2".to_string()),
        ];
        let url = c.url_for("bounties", &query).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.test/api/bounties?limit=100&page=2"
        );
    }

    #[test]
    fn decode_empty_body_is_null() {
        assert_eq!(decode_body(b"").unwrap(), Value::Null);
        assert_eq!(decode_body(b"  \n").unwrap(), Value::Null);
    }

    #[test]
    fn decode_malformed_body_is_decode_error() {
        let err = decode_body(b"<html>").unwrap_err();
        assert!(matches!(err, UpstreamError::Decode(_)));
    }

    #[test]
    fn request_query_value_lookup() {
        let req = UpstreamRequest::get("bounties")
            .with_query(vec![("page".to_string(), "3".to_string())]);
        assert_eq!(req.query_value("page"), Some("3"));
        assert_eq!(req.query_value("limit"), None);
    }

    #[tokio::test]
    async fn unreachable_host_maps_to_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let c = client(&format!("http://127.0.0.1:{port}/api"));
        let err = c.fetch("users/stats", &[]).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Unreachable(_)));
    }
}
