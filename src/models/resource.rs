//! The upstream resources this service mirrors.

use serde::Serialize;

/// Identifies one upstream resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    UserStats,
    GigStats,
    Bounties,
    Categories,
    Organizations,
    Users,
}

impl ResourceKind {
    /// Sources that drive the dashboard's loading and error signals, in error-priority order.
    pub const DASHBOARD_PRIORITY: [Self; 5] = [
        Self::UserStats,
        Self::GigStats,
        Self::Bounties,
        Self::Categories,
        Self::Organizations,
    ];

    pub const ALL: [Self; 6] = [
        Self::UserStats,
        Self::GigStats,
        Self::Bounties,
        Self::Categories,
        Self::Organizations,
        Self::Users,
    ];

    /// Path relative to the upstream (and proxy) base address.
    pub fn path(self) -> &'static str {
        match self {
            Self::UserStats => "users/stats",
            Self::GigStats => "gigs/stats",
            Self::Bounties => "bounties",
            Self::Categories => "bounties/categories",
            Self::Organizations => "bounties/organizations",
            Self::Users => "users",
        }
    }

    /// Human-readable name used in failure messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::UserStats => "user statistics",
            Self::GigStats => "gig statistics",
            Self::Bounties => "bounties",
            Self::Categories => "categories",
            Self::Organizations => "organizations",
            Self::Users => "users",
        }
    }

    pub fn failure_message(self) -> String {
        format!("Failed to fetch {}", self.label())
    }

    /// Resolve a request path (leading/trailing slashes ignored).
    pub fn from_path(path: &str) -> Option<Self> {
        let trimmed = path.trim_matches('/');
        Self::ALL.into_iter().find(|kind| kind.path() == trimmed)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}
