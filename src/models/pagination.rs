//! Paging primitives shared by the stitcher and the proxy.

use serde_json::Value;

/// How a paginated listing is scanned: the per-page limit and the page-count bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingPolicy {
    page_limit: usize,
    max_pages: usize,
}

impl PagingPolicy {
    /// Page size the upstream bounty listing is known to honour.
    pub const DEFAULT_PAGE_LIMIT: usize = 100;

    /// Safety bound on the number of pages requested per stitch.
    pub const DEFAULT_MAX_PAGES: usize = 3;

    /// Both values are clamped to at least 1.
    pub fn new(page_limit: usize, max_pages: usize) -> Self {
        Self {
            page_limit: page_limit.max(1),
            max_pages: max_pages.max(1),
        }
    }

    pub fn page_limit(&self) -> usize {
        self.page_limit
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Query pairs requesting the given 1-based page.
    pub fn query_for(&self, page: usize) -> Vec<(String, String)> {
        vec![
            ("limit".to_string(), self.page_limit.to_string()),
            ("page".to_string(), page.to_string()),
        ]
    }
}

impl Default for PagingPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PAGE_LIMIT, Self::DEFAULT_MAX_PAGES)
    }
}

/// One page of a listing, as returned by the upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePage {
    pub items: Vec<Value>,
    pub page_size: usize,
    pub requested_limit: usize,
}

impl ResourcePage {
    /// Extract the items nested under the `data` envelope key.
    ///
    /// A body without a `data` array yields an empty page.
    pub fn from_body(body: &Value, requested_limit: usize) -> Self {
        let items = body
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Self {
            page_size: items.len(),
            items,
            requested_limit,
        }
    }

    /// Only a page of exactly `requested_limit` items may have a successor;
    /// short and oversized pages both end the listing.
    pub fn is_full(&self) -> bool {
        self.page_size == self.requested_limit
    }
}

/// Items from consecutive pages, concatenated in fetch order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedCollection {
    items: Vec<Value>,
    pages_fetched: usize,
}

impl AggregatedCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_page(&mut self, page: ResourcePage) {
        self.items.extend(page.items);
        self.pages_fetched += 1;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn into_items(self) -> Vec<Value> {
        self.items
    }
}
