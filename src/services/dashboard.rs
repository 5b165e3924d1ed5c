//! Dashboard aggregation over the independent resource queries.
//!
//! The combined loading/error signals and the merged snapshot are a pure
//! fold over per-source [`QueryState`]s; the aggregator keeps no flags of
//! its own.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use crate::errors::QueryError;
use crate::models::records::{
    GigStats, NormalizedBounty, NormalizedCategory, NormalizedOrganization, NormalizedUser,
    UserStats,
};
use crate::models::resource::ResourceKind;
use crate::models::snapshot::DashboardSnapshot;
use crate::services::query::{Fetch, ProxyFetcher, QueryOptions, QueryState, ResourceQuery};
use crate::services::upstream::Upstream;

const MINUTE: Duration = Duration::from_secs(60);

/// Per-source scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardSchedule {
    pub user_stats: QueryOptions,
    pub gig_stats: QueryOptions,
    pub bounties: QueryOptions,
    pub categories: QueryOptions,
    pub organizations: QueryOptions,
    pub top_users: QueryOptions,
}

impl Default for DashboardSchedule {
    fn default() -> Self {
        Self {
            user_stats: QueryOptions::polling(5 * MINUTE),
            gig_stats: QueryOptions::polling(5 * MINUTE),
            bounties: QueryOptions::polling(2 * MINUTE),
            categories: QueryOptions::on_demand(10 * MINUTE),
            organizations: QueryOptions::on_demand(10 * MINUTE),
            top_users: QueryOptions::on_demand(10 * MINUTE),
        }
    }
}

impl DashboardSchedule {
    /// Same schedule with retries disabled on every source.
    pub fn without_retries(self) -> Self {
        Self {
            user_stats: self.user_stats.with_retries(0),
            gig_stats: self.gig_stats.with_retries(0),
            bounties: self.bounties.with_retries(0),
            categories: self.categories.with_retries(0),
            organizations: self.organizations.with_retries(0),
            top_users: self.top_users.with_retries(0),
        }
    }
}

/// Where each source gets its data from.
pub struct DashboardFetchers {
    pub user_stats: Arc<dyn Fetch<UserStats>>,
    pub gig_stats: Arc<dyn Fetch<GigStats>>,
    pub bounties: Arc<dyn Fetch<Vec<NormalizedBounty>>>,
    pub categories: Arc<dyn Fetch<Vec<NormalizedCategory>>>,
    pub organizations: Arc<dyn Fetch<Vec<NormalizedOrganization>>>,
    pub top_users: Arc<dyn Fetch<Vec<NormalizedUser>>>,
}

impl DashboardFetchers {
    /// Fetchers reading every resource through the proxy.
    pub fn via_proxy(proxy: Arc<dyn Upstream>) -> Self {
        Self {
            user_stats: Arc::new(ProxyFetcher::new(
                Arc::clone(&proxy),
                ResourceKind::UserStats,
                UserStats::from_body,
            )),
            gig_stats: Arc::new(ProxyFetcher::new(
                Arc::clone(&proxy),
                ResourceKind::GigStats,
                GigStats::from_body,
            )),
            bounties: Arc::new(ProxyFetcher::new(
                Arc::clone(&proxy),
                ResourceKind::Bounties,
                |body: &Value| NormalizedBounty::list_from_body(body, Utc::now()),
            )),
            categories: Arc::new(ProxyFetcher::new(
                Arc::clone(&proxy),
                ResourceKind::Categories,
                NormalizedCategory::list_from_body,
            )),
            organizations: Arc::new(ProxyFetcher::new(
                Arc::clone(&proxy),
                ResourceKind::Organizations,
                NormalizedOrganization::list_from_body,
            )),
            top_users: Arc::new(ProxyFetcher::new(
                proxy,
                ResourceKind::Users,
                NormalizedUser::top_from_body,
            )),
        }
    }
}

/// Point-in-time state of every source.
#[derive(Debug, Clone)]
pub struct SourceStates {
    pub user_stats: QueryState<UserStats>,
    pub gig_stats: QueryState<GigStats>,
    pub bounties: QueryState<Vec<NormalizedBounty>>,
    pub categories: QueryState<Vec<NormalizedCategory>>,
    pub organizations: QueryState<Vec<NormalizedOrganization>>,
    pub top_users: QueryState<Vec<NormalizedUser>>,
}

impl SourceStates {
    /// Loading flag and error of one source.
    fn signal(&self, kind: ResourceKind) -> (bool, Option<&QueryError>) {
        fn of<T>(state: &QueryState<T>) -> (bool, Option<&QueryError>) {
            (state.is_loading(), state.error.as_ref())
        }
        match kind {
            ResourceKind::UserStats => of(&self.user_stats),
            ResourceKind::GigStats => of(&self.gig_stats),
            ResourceKind::Bounties => of(&self.bounties),
            ResourceKind::Categories => of(&self.categories),
            ResourceKind::Organizations => of(&self.organizations),
            ResourceKind::Users => of(&self.top_users),
        }
    }

    /// Some source (top users included) is pending or has a fetch in flight.
    pub fn is_busy(&self) -> bool {
        [
            self.user_stats.is_loading() || self.user_stats.is_fetching(),
            self.gig_stats.is_loading() || self.gig_stats.is_fetching(),
            self.bounties.is_loading() || self.bounties.is_fetching(),
            self.categories.is_loading() || self.categories.is_fetching(),
            self.organizations.is_loading() || self.organizations.is_fetching(),
            self.top_users.is_loading() || self.top_users.is_fetching(),
        ]
        .into_iter()
        .any(|busy| busy)
    }
}

/// The aggregated view handed to the rendering side.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub data: DashboardSnapshot,
    pub is_loading: bool,
    pub is_error: bool,
    /// First failure in priority order: user stats, gig stats, bounties,
    /// categories, organizations.
    pub error: Option<QueryError>,
}

/// Fold per-source states into one view.
pub fn combine(states: SourceStates) -> DashboardView {
    let signals = ResourceKind::DASHBOARD_PRIORITY.map(|kind| states.signal(kind));
    let is_loading = signals.iter().any(|(loading, _)| *loading);
    let error = signals.iter().find_map(|(_, error)| error.cloned());

    DashboardView {
        is_loading,
        is_error: error.is_some(),
        error,
        data: DashboardSnapshot {
            user_stats: states.user_stats.data,
            gig_stats: states.gig_stats.data,
            bounties: states.bounties.data,
            categories: states.categories.data,
            organizations: states.organizations.data,
            top_users: states.top_users.data,
        },
    }
}

/// Owns one query per resource and derives the combined view from them.
pub struct Dashboard {
    user_stats: ResourceQuery<UserStats>,
    gig_stats: ResourceQuery<GigStats>,
    bounties: ResourceQuery<Vec<NormalizedBounty>>,
    categories: ResourceQuery<Vec<NormalizedCategory>>,
    organizations: ResourceQuery<Vec<NormalizedOrganization>>,
    top_users: ResourceQuery<Vec<NormalizedUser>>,
}

impl Dashboard {
    /// Start every query. Must be called inside a tokio runtime.
    pub fn start(fetchers: DashboardFetchers, schedule: DashboardSchedule) -> Self {
        Self {
            user_stats: ResourceQuery::spawn(
                ResourceKind::UserStats,
                fetchers.user_stats,
                schedule.user_stats,
            ),
            gig_stats: ResourceQuery::spawn(
                ResourceKind::GigStats,
                fetchers.gig_stats,
                schedule.gig_stats,
            ),
            bounties: ResourceQuery::spawn(
                ResourceKind::Bounties,
                fetchers.bounties,
                schedule.bounties,
            ),
            categories: ResourceQuery::spawn(
                ResourceKind::Categories,
                fetchers.categories,
                schedule.categories,
            ),
            organizations: ResourceQuery::spawn(
                ResourceKind::Organizations,
                fetchers.organizations,
                schedule.organizations,
            ),
            top_users: ResourceQuery::spawn(
                ResourceKind::Users,
                fetchers.top_users,
                schedule.top_users,
            ),
        }
    }

    /// Start every query against a running proxy.
    pub fn connect(proxy: Arc<dyn Upstream>, schedule: DashboardSchedule) -> Self {
        Self::start(DashboardFetchers::via_proxy(proxy), schedule)
    }

    pub fn states(&self) -> SourceStates {
        SourceStates {
            user_stats: self.user_stats.state(),
            gig_stats: self.gig_stats.state(),
            bounties: self.bounties.state(),
            categories: self.categories.state(),
            organizations: self.organizations.state(),
            top_users: self.top_users.state(),
        }
    }

    pub fn observe(&self) -> DashboardView {
        combine(self.states())
    }

    /// Refetch every source concurrently; returns before any completes.
    pub fn refetch(&self) {
        tracing::info!("Refetching all dashboard sources");
        self.user_stats.refetch();
        self.gig_stats.refetch();
        self.bounties.refetch();
        self.categories.refetch();
        self.organizations.refetch();
        self.top_users.refetch();
    }

    /// Refetch the sources whose data is missing or past its staleness window.
    pub fn revalidate_stale(&self) -> Vec<ResourceKind> {
        let mut started = Vec::new();
        if self.user_stats.revalidate() {
            started.push(ResourceKind::UserStats);
        }
        if self.gig_stats.revalidate() {
            started.push(ResourceKind::GigStats);
        }
        if self.bounties.revalidate() {
            started.push(ResourceKind::Bounties);
        }
        if self.categories.revalidate() {
            started.push(ResourceKind::Categories);
        }
        if self.organizations.revalidate() {
            started.push(ResourceKind::Organizations);
        }
        if self.top_users.revalidate() {
            started.push(ResourceKind::Users);
        }
        started
    }

    /// Wait until no source is pending or fetching, then return the view.
    pub async fn settled(&self) -> DashboardView {
        let mut user_stats = self.user_stats.subscribe();
        let mut gig_stats = self.gig_stats.subscribe();
        let mut bounties = self.bounties.subscribe();
        let mut categories = self.categories.subscribe();
        let mut organizations = self.organizations.subscribe();
        let mut top_users = self.top_users.subscribe();

        loop {
            let states = self.states();
            if !states.is_busy() {
                return combine(states);
            }
            // Senders live as long as `self`, so `changed` cannot report closure here.
            tokio::select! {
                _ = user_stats.changed() => {}
                _ = gig_stats.changed() => {}
                _ = bounties.changed() => {}
                _ = categories.changed() => {}
                _ = organizations.changed() => {}
                _ = top_users.changed() => {}
            }
        }
    }
}
