pub mod matches;
pub mod vehicles;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::DispatchConfig;
use crate::error::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(matches::router())
        .merge(vehicles::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/config/reload", post(reload_config))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    config_version: u64,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        config_version: state.config.version(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}

#[derive(Serialize)]
struct ReloadResponse {
    config_version: u64,
}

/// Rebuilds the dispatch config from the environment and swaps it in.
async fn reload_config(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReloadResponse>, AppError> {
    let config = DispatchConfig::from_lookup(|key| std::env::var(key).ok())
        .map_err(|err| AppError::BadRequest(err.to_string()))?;
    let config_version = state
        .config
        .reload(config)
        .map_err(|err| AppError::BadRequest(err.to_string()))?;

    Ok(Json(ReloadResponse { config_version }))
}
