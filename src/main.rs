use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use translation_hub::api::{create_router, AppState};
use translation_hub::cache::MemoryCacheStore;
use translation_hub::config::Config;
use translation_hub::db::Database;
use translation_hub::retry::{with_retry_if, RetryConfig};
use translation_hub::store::StoreError;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("translation_hub=info".parse()?),
        )
        .init();

    info!("Starting translation service");

    // Load configuration from environment
    let config = Config::from_env()?;

    // Connect (and migrate) with retries so a booting database doesn't kill startup
    let db = with_retry_if(
        &RetryConfig::database_connect(),
        "Database connect",
        || Database::connect(&config.database_url, config.database_max_connections),
        StoreError::is_transient,
    )
    .await?;
    info!("Database ready");

    let state = AppState::new(
        Arc::new(db),
        Arc::new(MemoryCacheStore::new()),
        config.cache_settings(),
    )
    .with_api_key(config.api_key.clone())
    .with_export_timeout(config.export_timeout());

    if state.api_key.is_none() {
        info!("API_KEY not set, endpoints are unauthenticated");
    }

    let app = create_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
