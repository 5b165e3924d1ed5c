//! Pagination stitcher: scans consecutive pages of a listing into one collection.
//!
//! Pages are fetched strictly in order since each request depends on the
//! previous page's size. A page-1 failure fails the whole scan; a failure on
//! any later page ends the scan and keeps what was already collected.

use serde_json::Value;

use crate::errors::UpstreamError;
use crate::models::pagination::{AggregatedCollection, PagingPolicy, ResourcePage};
use crate::services::upstream::Upstream;

/// Result of a stitched scan: the page-1 envelope plus every collected item.
#[derive(Debug, Clone)]
pub struct StitchedListing {
    first_body: Value,
    collection: AggregatedCollection,
}

impl StitchedListing {
    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    pub fn pages_fetched(&self) -> usize {
        self.collection.pages_fetched()
    }

    /// The page-1 body with its `data` array replaced by the stitched items.
    ///
    /// A page-1 body without a `data` array is returned untouched.
    pub fn into_body(self) -> Value {
        let mut body = self.first_body;
        if let Some(data) = body.get_mut("data").filter(|d| d.is_array()) {
            *data = Value::Array(self.collection.into_items());
        }
        body
    }
}

/// Fetch every page of `path` allowed by `policy`, stopping at the first
/// page that is not exactly full, the first later-page failure, or the
/// page-count bound.
pub async fn fetch_all(
    upstream: &dyn Upstream,
    path: &str,
    policy: PagingPolicy,
) -> Result<StitchedListing, UpstreamError> {
    let limit = policy.page_limit();
    let first_body = upstream.fetch(path, &policy.query_for(1)).await?;

    let first = ResourcePage::from_body(&first_body, limit);
    let mut more = first.is_full();
    let mut collection = AggregatedCollection::new();
    collection.push_page(first);

    for page in 2..=policy.max_pages() {
        if !more {
            break;
        }
        match upstream.fetch(path, &policy.query_for(page)).await {
            Ok(body) => {
                let next = ResourcePage::from_body(&body, limit);
                more = next.is_full();
                collection.push_page(next);
                tracing::debug!(path, page, total = collection.len(), "Stitched page");
            }
            Err(error) => {
                tracing::warn!(
                    path,
                    page,
                    error = %error,
                    kept = collection.len(),
                    "Page fetch failed, returning pages fetched so far"
                );
                break;
            }
        }
    }

    if more && collection.pages_fetched() == policy.max_pages() {
        tracing::info!(path, max_pages = policy.max_pages(), "Page bound reached");
    }

    Ok(StitchedListing {
        first_body,
        collection,
    })
}
