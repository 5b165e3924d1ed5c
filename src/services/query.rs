//! Independently scheduled resource queries.
//!
//! Each [`ResourceQuery`] owns one `watch` channel holding its
//! [`QueryState`]. Only the query's own fetch tasks write to it; everyone
//! else reads snapshots. Fetches are never cancelled: overlapping fetches all
//! complete and the last one to resolve wins.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::errors::{QueryError, UpstreamError};
use crate::models::resource::ResourceKind;
use crate::services::upstream::Upstream;

/// Produces one fresh value of a resource.
#[async_trait]
pub trait Fetch<T>: Send + Sync {
    async fn fetch(&self) -> Result<T, UpstreamError>;
}

/// Fetches a resource through the proxy and normalizes its body.
pub struct ProxyFetcher<T> {
    client: Arc<dyn Upstream>,
    kind: ResourceKind,
    normalize: fn(&Value) -> T,
}

impl<T> ProxyFetcher<T> {
    pub fn new(client: Arc<dyn Upstream>, kind: ResourceKind, normalize: fn(&Value) -> T) -> Self {
        Self {
            client,
            kind,
            normalize,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Fetch<T> for ProxyFetcher<T> {
    async fn fetch(&self) -> Result<T, UpstreamError> {
        let body = self.client.fetch(self.kind.path(), &[]).await?;
        Ok((self.normalize)(&body))
    }
}

/// Scheduling for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Background refresh cadence; `None` refreshes on demand only.
    pub refetch_interval: Option<Duration>,
    /// How long resolved data counts as fresh for [`ResourceQuery::revalidate`].
    pub stale_time: Duration,
    /// Extra attempts after a failed fetch, with exponential backoff.
    pub retries: u32,
}

impl QueryOptions {
    pub const DEFAULT_RETRIES: u32 = 3;

    pub const fn polling(every: Duration) -> Self {
        Self {
            refetch_interval: Some(every),
            stale_time: Duration::ZERO,
            retries: Self::DEFAULT_RETRIES,
        }
    }

    pub const fn on_demand(stale_time: Duration) -> Self {
        Self {
            refetch_interval: None,
            stale_time,
            retries: Self::DEFAULT_RETRIES,
        }
    }

    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// 1s, 2s, 4s, ... capped at 30s.
    fn backoff(attempt: u32) -> Duration {
        let millis = 1_000u64.saturating_mul(1u64 << attempt.min(5));
        Duration::from_millis(millis.min(30_000))
    }
}

/// Snapshot of one query's lifecycle.
#[derive(Debug, Clone)]
pub struct QueryState<T> {
    /// Last successfully fetched value; kept while later fetches run or fail.
    pub data: Option<T>,
    /// Outcome of the most recent failed resolution, cleared by a success.
    pub error: Option<QueryError>,
    pub in_flight: usize,
    pub updated_at: Option<Instant>,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            in_flight: 0,
            updated_at: None,
        }
    }
}

impl<T> QueryState<T> {
    /// Still waiting for the first resolution.
    pub fn is_loading(&self) -> bool {
        self.data.is_none() && self.error.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight > 0
    }

    pub fn is_stale(&self, now: Instant, stale_time: Duration) -> bool {
        match self.updated_at {
            Some(at) if self.data.is_some() => now.saturating_duration_since(at) >= stale_time,
            _ => true,
        }
    }

    fn finish(&mut self, result: Result<T, QueryError>, now: Instant) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match result {
            Ok(data) => {
                self.data = Some(data);
                self.error = None;
                self.updated_at = Some(now);
            }
            Err(error) => self.error = Some(error),
        }
    }
}

struct Inner<T> {
    kind: ResourceKind,
    fetcher: Arc<dyn Fetch<T>>,
    options: QueryOptions,
    state: watch::Sender<QueryState<T>>,
}

impl<T: Clone + Send + Sync + 'static> Inner<T> {
    fn mark_started(&self) {
        self.state.send_modify(|s| s.in_flight += 1);
    }

    /// Run one fetch (with retries) and publish its outcome. Must follow `mark_started`.
    async fn complete(&self) {
        tracing::debug!(resource = %self.kind, "Fetching resource");
        let result = self.fetch_with_retry().await;
        match &result {
            Ok(_) => tracing::debug!(resource = %self.kind, "Resource resolved"),
            Err(error) => {
                tracing::warn!(resource = %self.kind, error = %error.source, "Resource fetch failed")
            }
        }
        self.state.send_modify(|s| s.finish(result, Instant::now()));
    }

    async fn fetch_with_retry(&self) -> Result<T, QueryError> {
        let mut attempt = 0;
        loop {
            match self.fetcher.fetch().await {
                Ok(data) => return Ok(data),
                Err(error) if attempt < self.options.retries => {
                    let delay = QueryOptions::backoff(attempt);
                    tracing::debug!(resource = %self.kind, attempt, error = %error, ?delay, "Retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(QueryError::new(self.kind, error)),
            }
        }
    }

    fn start_fetch(self: &Arc<Self>) {
        self.mark_started();
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.complete().await });
    }
}

/// One resource, fetched on creation and then per its [`QueryOptions`].
///
/// Must be created inside a tokio runtime. Dropping the query stops its
/// cadence timer; fetches already in flight still run to completion.
pub struct ResourceQuery<T> {
    inner: Arc<Inner<T>>,
    poller: Option<JoinHandle<()>>,
}

impl<T: Clone + Send + Sync + 'static> ResourceQuery<T> {
    pub fn spawn(kind: ResourceKind, fetcher: Arc<dyn Fetch<T>>, options: QueryOptions) -> Self {
        let (state, _) = watch::channel(QueryState::default());
        let inner = Arc::new(Inner {
            kind,
            fetcher,
            options,
            state,
        });

        inner.start_fetch();
        let poller = options
            .refetch_interval
            .map(|every| tokio::spawn(poll(Arc::clone(&inner), every)));

        Self { inner, poller }
    }

    pub fn state(&self) -> QueryState<T> {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.inner.state.subscribe()
    }

    /// Start a fetch now and return without waiting for it.
    pub fn refetch(&self) {
        self.inner.start_fetch();
    }

    /// Refetch only when the data is missing or older than the staleness
    /// window and no fetch is already running. Returns whether one started.
    pub fn revalidate(&self) -> bool {
        let needed = {
            let state = self.inner.state.borrow();
            !state.is_fetching() && state.is_stale(Instant::now(), self.inner.options.stale_time)
        };
        if needed {
            self.refetch();
        }
        needed
    }
}

impl<T> Drop for ResourceQuery<T> {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

async fn poll<T: Clone + Send + Sync + 'static>(inner: Arc<Inner<T>>, every: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let busy = inner.state.borrow().is_fetching();
        if busy {
            tracing::debug!(resource = %inner.kind, "Fetch in flight, skipping scheduled refresh");
            continue;
        }
        tracing::debug!(resource = %inner.kind, at = %Utc::now(), "Scheduled refresh");
        inner.mark_started();
        inner.complete().await;
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedFetch;
    use super::*;
    use crate::services::upstream::testing::FakeUpstream;
    use serde_json::json;

    const SECOND: Duration = Duration::from_secs(1);

    fn unreachable() -> UpstreamError {
        UpstreamError::Unreachable("refused".to_string())
    }

    async fn settle<T: Clone + Send + Sync + 'static>(query: &ResourceQuery<T>) -> QueryState<T> {
        let mut rx = query.subscribe();
        loop {
            {
                let state = rx.borrow_and_update();
                if !state.is_fetching() {
                    return state.clone();
                }
            }
            rx.changed().await.unwrap();
        }
    }

    fn no_retry(options: QueryOptions) -> QueryOptions {
        options.with_retries(0)
    }

    #[tokio::test(start_paused = true)]
    async fn starts_pending_then_resolves() {
        let fetch = ScriptedFetch::new(vec![(SECOND, Ok(7u32))]);
        let query = ResourceQuery::<u32>::spawn(
            ResourceKind::UserStats,
            fetch.clone(),
            no_retry(QueryOptions::on_demand(10 * 60 * SECOND)),
        );
        let initial = query.state();
        assert!(initial.is_loading());
        assert!(initial.is_fetching());

        let state = settle(&query).await;
        assert_eq!(state.data, Some(7));
        assert!(!state.is_loading());
        assert!(!state.is_error());
        assert_eq!(fetch.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_sets_error_and_stops_loading() {
        let query = ResourceQuery::<u32>::spawn(
            ResourceKind::Categories,
            ScriptedFetch::<u32>::failing(unreachable()),
            no_retry(QueryOptions::on_demand(SECOND)),
        );
        let state = settle(&query).await;
        assert!(!state.is_loading());
        assert!(state.is_error());
        assert_eq!(state.error.unwrap().resource, ResourceKind::Categories);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_data_survives_failed_refresh() {
        let fetch = ScriptedFetch::new(vec![
            (Duration::ZERO, Ok(1u32)),
            (Duration::ZERO, Err(unreachable())),
        ]);
        let query = ResourceQuery::<u32>::spawn(
            ResourceKind::Bounties,
            fetch,
            no_retry(QueryOptions::on_demand(SECOND)),
        );
        settle(&query).await;

        query.refetch();
        let state = settle(&query).await;
        assert_eq!(state.data, Some(1));
        assert!(state.is_error());
        assert!(!state.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn success_clears_previous_error() {
        let fetch = ScriptedFetch::new(vec![
            (Duration::ZERO, Err(unreachable())),
            (Duration::ZERO, Ok(5u32)),
        ]);
        let query = ResourceQuery::<u32>::spawn(
            ResourceKind::GigStats,
            fetch,
            no_retry(QueryOptions::on_demand(SECOND)),
        );
        assert!(settle(&query).await.is_error());

        query.refetch();
        let state = settle(&query).await;
        assert_eq!(state.data, Some(5));
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn data_stays_visible_while_refreshing() {
        let fetch = ScriptedFetch::new(vec![
            (Duration::ZERO, Ok(1u32)),
            (5 * SECOND, Ok(2u32)),
        ]);
        let query = ResourceQuery::<u32>::spawn(
            ResourceKind::Bounties,
            fetch,
            no_retry(QueryOptions::on_demand(SECOND)),
        );
        settle(&query).await;

        query.refetch();
        let during = query.state();
        assert!(during.is_fetching());
        assert_eq!(during.data, Some(1));

        assert_eq!(settle(&query).await.data, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_fetches_last_resolution_wins() {
        // Initial fetch resolves quickly; the first refetch is slow, the second fast.
        let fetch = ScriptedFetch::new(vec![
            (Duration::ZERO, Ok(0u32)),
            (10 * SECOND, Ok(1u32)),
            (SECOND, Ok(2u32)),
        ]);
        let query = ResourceQuery::<u32>::spawn(
            ResourceKind::Organizations,
            fetch.clone(),
            no_retry(QueryOptions::on_demand(SECOND)),
        );
        settle(&query).await;

        query.refetch();
        tokio::task::yield_now().await;
        query.refetch();
        assert_eq!(query.state().in_flight, 2);

        let state = settle(&query).await;
        assert_eq!(state.data, Some(1));
        assert_eq!(fetch.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_cadence_refetches() {
        let fetch = ScriptedFetch::ok(3u32);
        let query = ResourceQuery::<u32>::spawn(
            ResourceKind::Bounties,
            fetch.clone(),
            no_retry(QueryOptions::polling(120 * SECOND)),
        );
        settle(&query).await;
        assert_eq!(fetch.calls(), 1);

        tokio::time::sleep(121 * SECOND).await;
        settle(&query).await;
        assert_eq!(fetch.calls(), 2);

        tokio::time::sleep(120 * SECOND).await;
        settle(&query).await;
        assert_eq!(fetch.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_refresh_skips_while_refetch_in_flight() {
        let fetch = ScriptedFetch::new(vec![
            (Duration::ZERO, Ok(1u32)),
            (200 * SECOND, Ok(2u32)),
            (Duration::ZERO, Ok(3u32)),
        ]);
        let query = ResourceQuery::<u32>::spawn(
            ResourceKind::Bounties,
            fetch.clone(),
            no_retry(QueryOptions::polling(120 * SECOND)),
        );
        settle(&query).await;

        query.refetch();
        // The tick at 120s lands while the refetch is still running.
        tokio::time::sleep(130 * SECOND).await;
        assert_eq!(fetch.calls(), 2);
        assert_eq!(query.state().in_flight, 1);

        assert_eq!(settle(&query).await.data, Some(2));
        tokio::time::sleep(50 * SECOND).await;
        let state = settle(&query).await;
        assert_eq!(fetch.calls(), 3);
        assert_eq!(state.data, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn on_demand_query_does_not_poll() {
        let fetch = ScriptedFetch::ok(3u32);
        let query = ResourceQuery::<u32>::spawn(
            ResourceKind::Categories,
            fetch.clone(),
            no_retry(QueryOptions::on_demand(600 * SECOND)),
        );
        settle(&query).await;
        tokio::time::sleep(3600 * SECOND).await;
        assert_eq!(fetch.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn revalidate_respects_staleness_window() {
        let fetch = ScriptedFetch::ok(3u32);
        let query = ResourceQuery::<u32>::spawn(
            ResourceKind::Categories,
            fetch.clone(),
            no_retry(QueryOptions::on_demand(600 * SECOND)),
        );
        settle(&query).await;

        assert!(!query.revalidate());
        tokio::time::sleep(599 * SECOND).await;
        assert!(!query.revalidate());
        tokio::time::sleep(2 * SECOND).await;
        assert!(query.revalidate());
        settle(&query).await;
        assert_eq!(fetch.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_backoff_before_failing() {
        let fetch = ScriptedFetch::<u32>::failing(unreachable());
        let query = ResourceQuery::<u32>::spawn(
            ResourceKind::UserStats,
            fetch.clone(),
            QueryOptions::on_demand(SECOND).with_retries(2),
        );
        let started = Instant::now();
        let state = settle(&query).await;
        assert!(state.is_error());
        assert_eq!(fetch.calls(), 3);
        // 1s + 2s of backoff.
        assert!(started.elapsed() >= 3 * SECOND);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(QueryOptions::backoff(0), SECOND);
        assert_eq!(QueryOptions::backoff(1), 2 * SECOND);
        assert_eq!(QueryOptions::backoff(2), 4 * SECOND);
        assert_eq!(QueryOptions::backoff(10), 30 * SECOND);
    }

    #[tokio::test]
    async fn proxy_fetcher_normalizes_body() {
        let upstream = Arc::new(FakeUpstream::new(|_| {
            Ok(json!({ "data": [{ "name": "Design", "count": 4 }] }))
        }));
        let fetcher = ProxyFetcher::new(
            upstream.clone(),
            ResourceKind::Categories,
            crate::models::records::NormalizedCategory::list_from_body,
        );
        let categories = fetcher.fetch().await.unwrap();
        assert_eq!(categories[0].bounty_count, 4);
        assert_eq!(upstream.calls()[0].path, "bounties/categories");
    }
}
