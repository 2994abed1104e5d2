use crate::domain::{CapTableError, ValidationError};
use crate::engine::{ReplayError, WaterfallError};
use crate::orchestration::{PipelineError, ScenarioError, StageError};
use crate::report::ReportError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<ReplayError> for AppError {
    fn from(err: ReplayError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<CapTableError> for AppError {
    fn from(err: CapTableError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<WaterfallError> for AppError {
    fn from(err: WaterfallError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<ScenarioError> for AppError {
    fn from(err: ScenarioError) -> Self {
        match &err {
            ScenarioError::Waterfall { .. } => AppError::BadRequest(err.to_string()),
            ScenarioError::Worker(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match &err {
            PipelineError::Stage {
                source: StageError::Replay(_) | StageError::Waterfall(_),
                ..
            } => AppError::BadRequest(err.to_string()),
            _ => AppError::Internal(err.to_string()),
        }
    }
}

impl From<StageError> for AppError {
    fn from(err: StageError) -> Self {
        match err {
            StageError::Missing(_) => AppError::Internal(err.to_string()),
            StageError::Replay(e) => e.into(),
            StageError::Waterfall(e) => e.into(),
        }
    }
}

impl From<ReportError> for AppError {
    fn from(err: ReportError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
