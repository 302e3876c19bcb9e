use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::matching::FleetUtilization;
use crate::models::GeoPoint;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/vehicles/:id/position", patch(update_position))
        .route("/fleet/utilization", get(fleet_utilization))
}

#[derive(Deserialize)]
pub struct UpdatePositionRequest {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Serialize)]
pub struct UpdatePositionResponse {
    pub vehicle_id: String,
    pub position: GeoPoint,
}

async fn update_position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdatePositionRequest>,
) -> Result<Json<UpdatePositionResponse>, AppError> {
    if !(-90.0..=90.0).contains(&payload.lat) || !(-180.0..=180.0).contains(&payload.lng) {
        return Err(AppError::BadRequest("coordinates out of range".to_string()));
    }

    let position = GeoPoint {
        lat: payload.lat,
        lng: payload.lng,
    };
    if !state.resources.update_position(&id, position).await? {
        return Err(AppError::NotFound(format!("vehicle {id} not found")));
    }

    Ok(Json(UpdatePositionResponse {
        vehicle_id: id,
        position,
    }))
}

async fn fleet_utilization(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FleetUtilization>, AppError> {
    Ok(Json(state.engine.fleet_utilization().await?))
}
