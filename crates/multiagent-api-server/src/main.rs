use anyhow::Result;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info};

use multiagent_api_server::config::Settings;
use multiagent_api_server::handlers;
use multiagent_api_server::logging::init_logger;
use multiagent_api_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize logging
    init_logger(std::path::Path::new(&settings.storage.log_dir))?;
    info!("🚀 Starting multi-agent API server...");
    info!(
        "✅ Configuration loaded (llm: {}, vision: {}, embedding: {})",
        settings.llm.model, settings.vision.model, settings.embedding.model
    );

    let idle = Duration::from_secs(settings.server.session_idle_minutes * 60);
    let cleanup_every = Duration::from_secs(settings.server.cleanup_interval_seconds.max(1));

    // Server address
    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    let state = AppState::from_settings(settings)?;
    info!("✅ Agents initialized");

    // Idle session eviction; durable memory and indexes stay on disk
    let registry = state.registry.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cleanup_every);
        loop {
            ticker.tick().await;
            let evicted = registry.cleanup_idle(idle);
            debug!("Cleanup tick: {} evicted, {} resident", evicted, registry.len());
        }
    });

    let app = handlers::router(state);

    info!("🎯 Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
