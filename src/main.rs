use std::net::SocketAddr;

use anyhow::Context;
use dashboard_relay::config::AppConfig;
use dashboard_relay::{routes, AppState};
use mimalloc::MiMalloc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// M-MIMALLOC-APP: Use mimalloc as global allocator for improved performance.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dashboard_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid BACKEND_HOST/BACKEND_PORT")?;

    tracing::info!(
        host = %addr,
        upstream = %config.upstream_base_url,
        page_limit = config.bounty_paging.page_limit(),
        max_pages = config.bounty_paging.max_pages(),
        "Starting dashboard relay"
    );

    let state = AppState::from_config(config).context("Failed to build upstream client")?;
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
