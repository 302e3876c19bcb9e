use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::engine::response::Summary;
use crate::error::AppError;
use crate::models::matching::{
    AssignmentReceipt, CargoAnalysis, Match, PairEvaluation, ResourceMatch,
};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/matches", get(best_matches))
        .route("/matches/summary", get(best_matches_summary))
        .route("/matches/evaluate", post(evaluate_pair))
        .route("/matches/accept", post(accept_match))
        .route("/jobs/:id/matches", get(job_matches))
        .route("/jobs/:id/analysis", get(job_analysis))
        .route("/jobs/:id/urgent-vehicle", get(urgent_vehicle))
        .route("/vehicles/:id/matches", get(vehicle_matches))
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    fn resolve(&self, state: &AppState) -> Result<usize, AppError> {
        match self.limit {
            Some(0) => Err(AppError::BadRequest("limit must be > 0".to_string())),
            Some(limit) => Ok(limit),
            None => Ok(state.config.get().max_suggestions),
        }
    }
}

#[derive(Deserialize)]
pub struct PairRequest {
    pub job_id: String,
    pub vehicle_id: String,
}

#[derive(Deserialize)]
pub struct UrgentQuery {
    pub deadline_hours: Option<f64>,
}

async fn best_matches(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Match>>, AppError> {
    let limit = query.resolve(&state)?;
    Ok(Json(state.engine.find_best_matches(limit).await?))
}

async fn best_matches_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Summary>, AppError> {
    let limit = query.resolve(&state)?;
    let matches = state.engine.find_best_matches(limit).await?;
    Ok(Json(state.responses.summarize(&matches)))
}

async fn job_matches(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Match>>, AppError> {
    let limit = query.resolve(&state)?;
    Ok(Json(state.engine.find_matches_for_job(&id, limit).await?))
}

async fn vehicle_matches(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Match>>, AppError> {
    let limit = query.resolve(&state)?;
    Ok(Json(state.engine.find_matches_for_vehicle(&id, limit).await?))
}

async fn job_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CargoAnalysis>, AppError> {
    state
        .engine
        .analyze_job(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("job {id} not found")))
}

async fn urgent_vehicle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<UrgentQuery>,
) -> Result<Json<Option<ResourceMatch>>, AppError> {
    if let Some(hours) = query.deadline_hours {
        if !(hours > 0.0) {
            return Err(AppError::BadRequest(
                "deadline_hours must be > 0".to_string(),
            ));
        }
    }

    Ok(Json(
        state
            .engine
            .find_urgent_vehicle(&id, query.deadline_hours)
            .await?,
    ))
}

async fn evaluate_pair(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PairRequest>,
) -> Result<Json<PairEvaluation>, AppError> {
    Ok(Json(
        state
            .engine
            .evaluate_pair(&payload.job_id, &payload.vehicle_id)
            .await?,
    ))
}

async fn accept_match(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PairRequest>,
) -> Result<Json<AssignmentReceipt>, AppError> {
    Ok(Json(
        state
            .engine
            .accept_match(&payload.job_id, &payload.vehicle_id)
            .await?,
    ))
}
