use axum::extract::State;
use axum::Json;

use crate::api::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness plus the scenario limits this instance enforces.
pub async fn ready(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ready",
        "max_scenarios": state.config.max_scenarios,
        "scenario_concurrency": state.config.scenario_concurrency,
    }))
}
