//! drawdb HTTP/JSON gateway binary.

use std::sync::Arc;

use clap::Parser;
use drawdb_core::MySqlExecutor;
use drawdb_gateway::{create_router, AppState, Args, GatewayConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line args
    let args = Args::parse();
    let config = GatewayConfig::from(&args);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.default_log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(listen = %config.listen_addr, "Starting drawdb gateway");

    if config.pool.min_connections > config.pool.max_connections {
        anyhow::bail!("pool_min_connections cannot exceed pool_max_connections");
    }

    // The pool connects on first use, so the gateway comes up even when the
    // database is down and /api/health reports it as degraded.
    let executor = MySqlExecutor::connect_lazy(&config.dsn, &config.pool)?;
    info!(
        min_connections = config.pool.min_connections,
        max_connections = config.pool.max_connections,
        acquire_timeout_ms = config.pool.acquire_timeout.as_millis(),
        "Database pool ready"
    );

    // Create application state
    let state = AppState::new(Arc::new(executor), config.clone());

    // Create router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Gateway listening on {}", config.listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
