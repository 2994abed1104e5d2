use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::{csv_response, parse_body, prepare, AppState, OutputFormat};
use crate::domain::{CapTable, Decimal, ExitScenario, HolderId, ReturnsConfig, ShareClassId};
use crate::engine::returns::{ClassReturn, HolderReturn, InvestmentLedger, ReturnsSummary};
use crate::engine::waterfall::{ClassDistribution, HolderDistribution, WaterfallStep};
use crate::error::AppError;
use crate::orchestration::{run_scenarios, ScenarioRun};

#[derive(Debug, Deserialize)]
pub struct ReturnsRequest {
    pub cap_table: CapTable,
    #[serde(default)]
    pub as_of_date: Option<NaiveDate>,
    pub scenarios: Vec<ExitScenario>,
    /// Explicit invested amounts. Derived from position cost bases when absent.
    #[serde(default)]
    pub investments: Option<InvestmentLedger>,
    #[serde(default)]
    pub include_irr: Option<bool>,
    #[serde(default)]
    pub include_moic: Option<bool>,
    #[serde(default)]
    pub show_by_holder: Option<bool>,
    #[serde(default)]
    pub show_by_share_class: Option<bool>,
    #[serde(default)]
    pub show_waterfall_steps: Option<bool>,
}

impl ReturnsRequest {
    fn returns_config(&self, include_irr_default: bool) -> ReturnsConfig {
        let defaults = ReturnsConfig::default();
        ReturnsConfig {
            scenarios: self.scenarios.clone(),
            include_irr: self.include_irr.unwrap_or(include_irr_default),
            include_moic: self.include_moic.unwrap_or(defaults.include_moic),
            show_by_holder: self.show_by_holder.unwrap_or(defaults.show_by_holder),
            show_by_share_class: self
                .show_by_share_class
                .unwrap_or(defaults.show_by_share_class),
            show_waterfall_steps: self
                .show_waterfall_steps
                .unwrap_or(defaults.show_waterfall_steps),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReturnsQuery {
    #[serde(default)]
    pub format: OutputFormat,
}

/// Flat per-position returns, one block of rows per scenario.
#[derive(Debug, Serialize)]
struct ReturnsCsvRow<'a> {
    scenario_id: &'a str,
    holder_id: &'a HolderId,
    share_class_id: &'a ShareClassId,
    investment_amount: Decimal,
    total_distribution: Decimal,
    moic: Option<Decimal>,
    irr: Option<Decimal>,
    cash_on_cash_return: Decimal,
}

fn csv_rows(runs: &[ScenarioRun]) -> Vec<ReturnsCsvRow<'_>> {
    runs.iter()
        .flat_map(|run| {
            run.returns.by_holder.iter().map(move |row| ReturnsCsvRow {
                scenario_id: &run.scenario_id,
                holder_id: &row.holder_id,
                share_class_id: &row.share_class_id,
                investment_amount: row.investment_amount,
                total_distribution: row.total_distribution,
                moic: row.moic,
                irr: row.irr,
                cash_on_cash_return: row.cash_on_cash_return,
            })
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct ScenarioWaterfall {
    pub net_proceeds: Decimal,
    pub total_distributed: Decimal,
    pub unallocated: Decimal,
    pub fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_holder: Option<Vec<HolderDistribution>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_class: Option<Vec<ClassDistribution>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<WaterfallStep>>,
}

#[derive(Debug, Serialize)]
pub struct ScenarioReturns {
    pub summary: ReturnsSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_holder: Option<Vec<HolderReturn>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_class: Option<Vec<ClassReturn>>,
}

#[derive(Debug, Serialize)]
pub struct ScenarioResponse {
    pub scenario_id: String,
    pub waterfall: ScenarioWaterfall,
    pub returns: ScenarioReturns,
}

#[derive(Debug, Serialize)]
pub struct ReturnsResponse {
    pub as_of_date: NaiveDate,
    pub snapshot_fingerprint: String,
    pub scenarios: Vec<ScenarioResponse>,
}

fn shape(run: ScenarioRun, config: &ReturnsConfig) -> ScenarioResponse {
    let ScenarioRun {
        scenario_id,
        waterfall,
        returns,
    } = run;
    ScenarioResponse {
        scenario_id,
        waterfall: ScenarioWaterfall {
            net_proceeds: waterfall.net_proceeds,
            total_distributed: waterfall.total_distributed,
            unallocated: waterfall.unallocated,
            fingerprint: waterfall.fingerprint,
            by_holder: config.show_by_holder.then_some(waterfall.by_holder),
            by_class: config.show_by_share_class.then_some(waterfall.by_class),
            steps: config.show_waterfall_steps.then_some(waterfall.steps),
        },
        returns: ScenarioReturns {
            summary: returns.summary,
            by_holder: config.show_by_holder.then_some(returns.by_holder),
            by_class: config.show_by_share_class.then_some(returns.by_class),
        },
    }
}

/// Run every posted exit scenario concurrently against one snapshot.
///
/// `?format=csv` returns the per-position returns of every scenario.
pub async fn post_returns(
    State(state): State<AppState>,
    Query(query): Query<ReturnsQuery>,
    payload: Result<Json<ReturnsRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = parse_body(payload)?;

    if request.scenarios.is_empty() {
        return Err(AppError::BadRequest(
            "at least one scenario is required".to_string(),
        ));
    }
    if request.scenarios.len() > state.config.max_scenarios {
        return Err(AppError::BadRequest(format!(
            "too many scenarios: {} (max {})",
            request.scenarios.len(),
            state.config.max_scenarios
        )));
    }

    let as_of_date = prepare(&request.cap_table, request.as_of_date)?;
    let config = request.returns_config(state.config.returns_include_irr);
    config.validate()?;

    let snapshot = Arc::new(request.cap_table.snapshot(as_of_date)?);
    let ledger = request
        .investments
        .unwrap_or_else(|| InvestmentLedger::from_snapshot(&snapshot));
    let config = Arc::new(config);

    let runs = run_scenarios(
        Arc::clone(&snapshot),
        Arc::new(ledger),
        Arc::clone(&config),
        state.config.scenario_concurrency,
    )
    .await?;

    if query.format == OutputFormat::Csv {
        return csv_response(&csv_rows(&runs));
    }

    Ok(Json(ReturnsResponse {
        as_of_date,
        snapshot_fingerprint: snapshot.fingerprint(),
        scenarios: runs.into_iter().map(|run| shape(run, &config)).collect(),
    })
    .into_response())
}
