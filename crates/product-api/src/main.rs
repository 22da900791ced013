//! # Product Catalog API Server
//!
//! Binary entry point for the product API service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use product_api::{ApiContext, Config, LogFormat, build_router};
use product_domain::Member;
use product_persistence::{CacheClient, PgRouter, RedisCache};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.clone().into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
    }

    tracing::info!(
        version = product_api::VERSION,
        "Starting Product Catalog API"
    );

    // Initialize PostgreSQL pools
    tracing::info!(
        primary = %format!("{}:{}", config.store.primary.host, config.store.primary.port),
        replica = %format!("{}:{}", config.store.replica.host, config.store.replica.port),
        dbname = %config.store.dbname,
        max_size = config.store.max_size,
        "Creating PostgreSQL pools"
    );
    let router = Arc::new(PgRouter::new(&config.store)?);

    if config.bootstrap_schema {
        router.ensure_schema().await?;
    }

    // Initialize Redis cache; the connection is opened on first use
    tracing::info!(url = %config.cache.url, "Configuring Redis cache");
    let cache = CacheClient::new(Arc::new(RedisCache::new(config.cache.clone())?));

    // Build API context
    let ctx = ApiContext::new(router.clone(), cache, &config);

    let startup = ctx.health.check().await;
    tracing::info!(
        healthy = startup.is_healthy(),
        primary_pool = router.pool_size(Member::Primary),
        replica_pool = router.pool_size(Member::Replica),
        "Startup health check"
    );

    // Build router
    let app = build_router(ctx.clone(), &config.cors_origins);

    // Start server
    let addr = config.server_addr;
    tracing::info!(%addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ctx.close();
    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
