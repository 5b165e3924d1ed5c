//! Headless dashboard: polls the relay's proxy and logs the combined view.
//!
//! Usage: cargo run --bin dashboard
//!
//! Reads DASHBOARD_PROXY_URL (defaults to the local relay).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use dashboard_relay::config::DashboardConfig;
use dashboard_relay::services::dashboard::{Dashboard, DashboardSchedule, DashboardView};
use dashboard_relay::services::insights::{
    last_updated_label, BountyStats, LoadingIndicator, SectionState,
};
use dashboard_relay::services::upstream::HttpUpstream;
use tokio::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const TICK: Duration = Duration::from_millis(250);
const REVALIDATE_EVERY: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dashboard=info,dashboard_relay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = DashboardConfig::from_env().context("Failed to load dashboard configuration")?;
    let proxy = HttpUpstream::new(config.proxy_url.clone(), None, "Dashboard/1.0")
        .context("Failed to build proxy client")?;

    tracing::info!(proxy = %config.proxy_url, "Starting dashboard");
    let dashboard = Dashboard::connect(Arc::new(proxy), DashboardSchedule::default());

    let mut indicator = LoadingIndicator::default();
    let mut spinner_shown = false;
    let mut last_view: Option<DashboardView> = None;
    let mut last_refresh: Option<DateTime<Utc>> = None;

    let mut tick = tokio::time::interval(TICK);
    let mut revalidate =
        tokio::time::interval_at(Instant::now() + REVALIDATE_EVERY, REVALIDATE_EVERY);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let view = dashboard.observe();

                let visible = indicator.update(view.is_loading, Instant::now());
                if visible && !spinner_shown {
                    tracing::info!("Loading dashboard data");
                }
                spinner_shown = visible;

                if last_view.as_ref() != Some(&view) {
                    if !view.is_loading {
                        last_refresh = Some(Utc::now());
                    }
                    report(&dashboard, &view, last_refresh);
                    last_view = Some(view);
                }
            }
            _ = revalidate.tick() => {
                let started = dashboard.revalidate_stale();
                if !started.is_empty() {
                    tracing::debug!(sources = ?started, "Revalidating stale sources");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down dashboard");
                break;
            }
        }
    }

    Ok(())
}

fn report(dashboard: &Dashboard, view: &DashboardView, last_refresh: Option<DateTime<Utc>>) {
    if let Some(error) = &view.error {
        tracing::warn!(error = %error, "Dashboard source failed");
    }

    let states = dashboard.states();
    let stats = BountyStats::from_bounties(view.data.bounties_or_empty());
    let updated = last_refresh.map(|at| last_updated_label(at, Utc::now()));
    tracing::info!(
        loading = view.is_loading,
        failed = view.is_error,
        total_users = view.data.user_stats.as_ref().map(|s| s.total_users),
        total_gigs = view.data.gig_stats.as_ref().map(|s| s.total_gigs),
        bounties = stats.total,
        active = stats.active,
        completed = stats.completed,
        disputed = stats.disputed,
        bounty_section = ?SectionState::of(&states.bounties),
        category_section = ?SectionState::of(&states.categories),
        organization_section = ?SectionState::of(&states.organizations),
        top_users_section = ?SectionState::of(&states.top_users),
        updated = updated.as_deref(),
        "Dashboard updated"
    );
}
