use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use fleet_matcher::api;
use fleet_matcher::config::{Config, ConfigProvider};
use fleet_matcher::error::AppError;
use fleet_matcher::sources::memory::{FleetSnapshot, InMemoryCargoSource, InMemoryFleet};
use fleet_matcher::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let provider = Arc::new(ConfigProvider::new(config.dispatch.clone())?);

    let (cargo, fleet) = match &config.seed_path {
        Some(path) => FleetSnapshot::load(path).await?.into_sources()?,
        None => {
            tracing::warn!("FLEET_SEED_PATH not set; starting with empty sources");
            (InMemoryCargoSource::new(), InMemoryFleet::new())
        }
    };

    let state = Arc::new(AppState::new(Arc::new(cargo), Arc::new(fleet), provider));
    let app = api::rest::router(state);

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
