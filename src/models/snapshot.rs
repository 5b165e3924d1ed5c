use serde::Serialize;

use super::records::{
    GigStats, NormalizedBounty, NormalizedCategory, NormalizedOrganization, NormalizedUser,
    UserStats,
};

/// Best-effort merged view of every dashboard source.
///
/// Each field is filled independently as soon as its source holds data; a
/// failed or pending source leaves only its own field absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub user_stats: Option<UserStats>,
    pub gig_stats: Option<GigStats>,
    pub bounties: Option<Vec<NormalizedBounty>>,
    pub categories: Option<Vec<NormalizedCategory>>,
    pub organizations: Option<Vec<NormalizedOrganization>>,
    pub top_users: Option<Vec<NormalizedUser>>,
}

impl DashboardSnapshot {
    /// Bounties, or an empty slice while the source has no data.
    pub fn bounties_or_empty(&self) -> &[NormalizedBounty] {
        self.bounties.as_deref().unwrap_or(&[])
    }
}
