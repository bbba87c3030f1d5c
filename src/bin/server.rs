//! Headless paper-trading server. No UI, no HTTP surface: metrics are
//! pushed as structured JSON log lines (`METRICS_JSON:...`), not scraped.
//!
//! ```sh
//! UNIVERSE=BTC,ETH,SOL OBSERVABILITY_INTERVAL_SECONDS=60 paperloop-server
//! ```

use anyhow::Result;
use paperloop::config::Config;
use paperloop::runtime::Application;
use tracing::{info, Level};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("paperloop server {} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!("universe: {:?}", config.universe.coins);

    let app = Application::build(config).await?;
    let handle = app.start().await?;

    info!("system running, press ctrl-c to shut down");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, draining workers");

    handle.request_shutdown();
    handle.wait().await;

    info!("shutdown complete");
    Ok(())
}
