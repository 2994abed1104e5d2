use axum::extract::rejection::JsonRejection;
use axum::extract::Query;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::{csv_response, parse_body, prepare, OutputFormat};
use crate::domain::{CapTable, Decimal, Position};
use crate::error::AppError;
use crate::orchestration::{Artifact, OwnershipStage, Pipeline, PipelineContext, SnapshotStage};
use crate::report::OwnershipReport;

#[derive(Debug, Deserialize)]
pub struct SnapshotRequest {
    pub cap_table: CapTable,
    #[serde(default)]
    pub as_of_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotQuery {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    pub company_name: String,
    pub as_of_date: NaiveDate,
    pub fingerprint: String,
    pub total_shares_outstanding: Decimal,
    pub fully_diluted_shares: Decimal,
    pub option_pool_authorized: Decimal,
    pub option_pool_available: Decimal,
    pub positions: Vec<Position>,
    pub ownership: OwnershipReport,
}

/// Replay the posted cap table and return positions plus ownership tables.
///
/// `?format=csv` returns the per-position ownership table instead.
pub async fn post_snapshot(
    Query(query): Query<SnapshotQuery>,
    payload: Result<Json<SnapshotRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = parse_body(payload)?;
    let as_of_date = prepare(&request.cap_table, request.as_of_date)?;
    let company_name = request.cap_table.company_name.clone();

    let pipeline = Pipeline::new(vec![Box::new(SnapshotStage), Box::new(OwnershipStage)])?;
    let mut ctx = PipelineContext::new()
        .with(Artifact::CapTable(Arc::new(request.cap_table)))
        .with(Artifact::AsOfDate(as_of_date));
    pipeline.run(&mut ctx)?;

    let snapshot = ctx.snapshot()?;
    let ownership = ctx.ownership()?;

    tracing::info!(
        company = %company_name,
        as_of = %as_of_date,
        positions = snapshot.positions().len(),
        "Snapshot served"
    );

    if query.format == OutputFormat::Csv {
        return csv_response(&ownership.ownership);
    }

    Ok(Json(SnapshotResponse {
        company_name,
        as_of_date,
        fingerprint: snapshot.fingerprint(),
        total_shares_outstanding: snapshot.total_shares_outstanding(),
        fully_diluted_shares: snapshot.fully_diluted_shares(),
        option_pool_authorized: snapshot.option_pool_authorized(),
        option_pool_available: snapshot.option_pool_available(),
        positions: snapshot.positions().to_vec(),
        ownership: ownership.clone(),
    })
    .into_response())
}
