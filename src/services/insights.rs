//! Derived figures and display states for the rendering side.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::models::records::NormalizedBounty;
use crate::services::query::QueryState;

/// Statuses counted as completed.
const COMPLETED_STATUSES: [&str; 3] = ["MINED", "FAILED", "Winner"];

/// Bounty counts by lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BountyStats {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub disputed: usize,
}

impl BountyStats {
    pub fn from_bounties(bounties: &[NormalizedBounty]) -> Self {
        bounties.iter().fold(
            Self {
                total: bounties.len(),
                ..Self::default()
            },
            |mut stats, bounty| {
                match bounty.status.as_str() {
                    "Open" => stats.active += 1,
                    "disputed" => stats.disputed += 1,
                    s if COMPLETED_STATUSES.contains(&s) => stats.completed += 1,
                    _ => {}
                }
                stats
            },
        )
    }
}

/// Bounties whose title or organization contains `search` (case-insensitive)
/// and whose category equals `category`; `"all"` matches every category.
pub fn filter_bounties<'a>(
    bounties: &'a [NormalizedBounty],
    search: &str,
    category: &str,
) -> Vec<&'a NormalizedBounty> {
    let needle = search.to_lowercase();
    let all_categories = category.eq_ignore_ascii_case("all");
    let category = category.to_lowercase();
    bounties
        .iter()
        .filter(|b| {
            b.title.to_lowercase().contains(&needle)
                || b.organization.to_lowercase().contains(&needle)
        })
        .filter(|b| all_categories || b.category.to_lowercase() == category)
        .collect()
}

/// What a section of the dashboard should show for one list source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionState {
    Loading,
    /// Failed with nothing to show; render a retry action.
    Failed,
    /// Resolved with no items; render "no data available".
    Empty,
    Ready,
}

impl SectionState {
    pub fn of<T>(state: &QueryState<Vec<T>>) -> Self {
        match &state.data {
            Some(items) if items.is_empty() => Self::Empty,
            Some(_) => Self::Ready,
            None if state.is_error() => Self::Failed,
            None => Self::Loading,
        }
    }
}

/// Reports loading as visible only once it has lasted past a threshold,
/// so fast responses do not flicker a spinner.
#[derive(Debug, Clone)]
pub struct LoadingIndicator {
    threshold: Duration,
    loading_since: Option<Instant>,
}

impl Default for LoadingIndicator {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl LoadingIndicator {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            loading_since: None,
        }
    }

    /// Feed the current loading flag; returns whether the indicator is visible.
    pub fn update(&mut self, is_loading: bool, now: Instant) -> bool {
        if !is_loading {
            self.loading_since = None;
            return false;
        }
        let since = *self.loading_since.get_or_insert(now);
        now.saturating_duration_since(since) >= self.threshold
    }
}

/// "just now", "1 minute ago", "N minutes ago".
pub fn last_updated_label(last: DateTime<Utc>, now: DateTime<Utc>) -> String {
    match (now - last).num_minutes() {
        m if m < 1 => "just now".to_string(),
        1 => "1 minute ago".to_string(),
        m => format!("{m} minutes ago"),
    }
}
