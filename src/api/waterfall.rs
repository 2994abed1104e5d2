use axum::extract::rejection::JsonRejection;
use axum::extract::Query;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::{csv_response, parse_body, prepare, OutputFormat};
use crate::domain::{CapTable, ExitScenario};
use crate::error::AppError;
use crate::orchestration::{Artifact, Pipeline, PipelineContext, SnapshotStage, WaterfallStage};

#[derive(Debug, Deserialize)]
pub struct WaterfallRequest {
    pub cap_table: CapTable,
    #[serde(default)]
    pub as_of_date: Option<NaiveDate>,
    pub scenario: ExitScenario,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaterfallTable {
    #[default]
    ByHolder,
    ByClass,
    Steps,
}

#[derive(Debug, Default, Deserialize)]
pub struct WaterfallQuery {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub table: WaterfallTable,
}

/// Distribute one exit scenario over the posted cap table.
pub async fn post_waterfall(
    Query(query): Query<WaterfallQuery>,
    payload: Result<Json<WaterfallRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = parse_body(payload)?;
    let as_of_date = prepare(&request.cap_table, request.as_of_date)?;

    let pipeline = Pipeline::new(vec![Box::new(SnapshotStage), Box::new(WaterfallStage)])?;
    let mut ctx = PipelineContext::new()
        .with(Artifact::CapTable(Arc::new(request.cap_table)))
        .with(Artifact::AsOfDate(as_of_date))
        .with(Artifact::Scenario(request.scenario));
    pipeline.run(&mut ctx)?;
    let result = ctx.waterfall()?;

    match (query.format, query.table) {
        (OutputFormat::Json, _) => Ok(Json(result).into_response()),
        (OutputFormat::Csv, WaterfallTable::ByHolder) => csv_response(&result.by_holder),
        (OutputFormat::Csv, WaterfallTable::ByClass) => csv_response(&result.by_class),
        (OutputFormat::Csv, WaterfallTable::Steps) => csv_response(&result.steps),
    }
}
