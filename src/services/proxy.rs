//! Aggregation proxy operations.
//!
//! Every known resource has one operation: the bounty listing is stitched
//! across pages, every other resource is a single pass-through call. Any
//! failure becomes an [`AppError::Upstream`] carrying the resource's message.

use std::sync::Arc;

use reqwest::{Method, StatusCode};

use crate::errors::{AppError, UpstreamError};
use crate::models::pagination::PagingPolicy;
use crate::models::resource::ResourceKind;
use crate::services::stitcher;
use crate::services::upstream::{Upstream, UpstreamReply, UpstreamRequest};

/// Message used when the path is not one of the known resources.
pub const GENERIC_FAILURE: &str = "Failed to fetch data from upstream API";

#[derive(Clone)]
pub struct ProxyService {
    upstream: Arc<dyn Upstream>,
    bounty_paging: PagingPolicy,
}

impl ProxyService {
    pub fn new(upstream: Arc<dyn Upstream>, bounty_paging: PagingPolicy) -> Self {
        Self {
            upstream,
            bounty_paging,
        }
    }

    /// Fetch one known resource.
    pub async fn resource(&self, kind: ResourceKind) -> Result<UpstreamReply, AppError> {
        let result = match kind {
            ResourceKind::Bounties => self.bounties().await,
            _ => self.upstream.send(UpstreamRequest::get(kind.path())).await,
        };
        result.map_err(|e| AppError::upstream(kind.failure_message(), e))
    }

    /// Route an incoming proxy request.
    ///
    /// A bare `GET bounties` is stitched; a bare `GET` of another known
    /// resource uses that resource's operation; everything else (other
    /// methods, explicit query strings, unknown paths) is forwarded verbatim.
    pub async fn dispatch(&self, request: UpstreamRequest) -> Result<UpstreamReply, AppError> {
        validate_path(&request.path)?;
        let kind = ResourceKind::from_path(&request.path);
        tracing::info!(method = %request.method, path = %request.path, "Proxying request");

        if request.method == Method::GET && request.query.is_empty() {
            if let Some(kind) = kind {
                return self.resource(kind).await;
            }
        }

        let message = kind
            .map(ResourceKind::failure_message)
            .unwrap_or_else(|| GENERIC_FAILURE.to_string());
        self.upstream
            .send(request)
            .await
            .map_err(|e| AppError::upstream(message, e))
    }

    async fn bounties(&self) -> Result<UpstreamReply, UpstreamError> {
        let listing = stitcher::fetch_all(
            self.upstream.as_ref(),
            ResourceKind::Bounties.path(),
            self.bounty_paging,
        )
        .await?;
        tracing::info!(
            total = listing.len(),
            pages = listing.pages_fetched(),
            "Stitched bounty listing"
        );
        Ok(UpstreamReply {
            status: StatusCode::OK,
            body: listing.into_body(),
        })
    }
}

/// Reject dot segments so a request cannot climb out of the upstream base path.
fn validate_path(path: &str) -> Result<(), AppError> {
    if path.split('/').any(|segment| segment == ".." || segment == ".") {
        return Err(AppError::Validation(format!(
            "path must not contain dot segments: {path}"
        )));
    }
    Ok(())
}
