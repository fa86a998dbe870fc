//! cardlab-cp - Card Processing Service
//!
//! Accepts batches of trading-card image pairs, runs them through the
//! external capability pipeline, and streams narrated progress over SSE.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use cardlab_cp::services::{HttpToolClient, ToolSuite};
use cardlab_cp::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting cardlab-cp (Card Processing) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = cardlab_common::config::CardLabConfig::load()?;
    info!("Toolhost: {}", config.toolhost.base_url);

    let invoker = HttpToolClient::new(config.toolhost.base_url.clone())
        .map_err(|e| anyhow::anyhow!("Failed to build toolhost client: {}", e))?;
    let tools = Arc::new(ToolSuite::new(Arc::new(invoker), &config.toolhost));

    let bind_address = config.bind_address.clone();
    let idle_timeout = Duration::from_secs(config.session.idle_timeout_secs);
    let state = AppState::new(config, tools);

    // Background sweeper for sessions abandoned without a results fetch
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            let removed = sessions.sweep_idle(idle_timeout).await;
            if removed > 0 {
                info!(removed, "Swept idle sessions");
            }
        }
    });

    let app = cardlab_cp::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
