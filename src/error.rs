use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::config::ConfigError;

/// Failure reported by a cargo or resource collaborator (storage, network).
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("{source_name} unavailable: {reason}")]
    Unavailable {
        source_name: &'static str,
        reason: String,
    },

    #[error("{source_name} returned invalid data: {reason}")]
    InvalidData {
        source_name: &'static str,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("upstream data error: {0}")]
    Upstream(#[from] SourceError),

    #[error("computation timeout after {0:?}")]
    ComputationTimeout(std::time::Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Timeouts and upstream failures are worth retrying; everything else is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Upstream(_) | AppError::ComputationTimeout(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::ComputationTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Configuration(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string(),
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}
