pub mod health;
pub mod returns;
pub mod snapshot;
pub mod waterfall;

use crate::config::Config;
use crate::domain::CapTable;
use crate::error::AppError;
use crate::report::to_csv;
use axum::extract::rejection::JsonRejection;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::{
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/snapshot", post(snapshot::post_snapshot))
        .route("/v1/waterfall", post(waterfall::post_waterfall))
        .route("/v1/returns", post(returns::post_returns))
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

/// Unwrap a JSON body, turning a malformed document into a 400.
pub(crate) fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// Validate the posted cap table and resolve the as-of date (today when absent).
pub(crate) fn prepare(
    cap_table: &CapTable,
    as_of_date: Option<NaiveDate>,
) -> Result<NaiveDate, AppError> {
    cap_table.validate()?;
    Ok(as_of_date.unwrap_or_else(|| chrono::Utc::now().date_naive()))
}

pub(crate) fn csv_response<T: Serialize>(rows: &[T]) -> Result<Response, AppError> {
    let body = to_csv(rows)?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], body).into_response())
}
