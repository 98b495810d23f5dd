//! QueryForge web server
//!
//! Run with: cargo run -p queryforge-web

use std::net::SocketAddr;

use queryforge_config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("queryforge=debug,info")),
        )
        .init();

    info!("Starting QueryForge...");

    let config = Config::load()?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!(
        env = %config.server.env,
        static_dir = %config.server.static_dir.display(),
        audit_table = %config.audit_table(),
        "Configuration loaded"
    );

    let state = queryforge_web::state::AppState::from_config(config).await;
    let app = queryforge_web::router::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
