//! Fan-out of many exit scenarios over one frozen snapshot.

use crate::domain::{ExitScenario, ReturnsConfig};
use crate::engine::returns::{compute_returns, InvestmentLedger, ReturnsReport};
use crate::engine::snapshot::CapTableSnapshot;
use crate::engine::waterfall::{distribute, WaterfallError, WaterfallResult};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("scenario {scenario_id}: {source}")]
    Waterfall {
        scenario_id: String,
        #[source]
        source: WaterfallError,
    },
    #[error("scenario worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioRun {
    pub scenario_id: String,
    pub waterfall: WaterfallResult,
    pub returns: ReturnsReport,
}

/// Evaluate every scenario in `config` against the shared snapshot.
///
/// Each scenario runs on the blocking pool with at most `concurrency` in
/// flight. Results come back in the order the scenarios were given. The first
/// failing scenario fails the batch.
pub async fn run_scenarios(
    snapshot: Arc<CapTableSnapshot>,
    ledger: Arc<InvestmentLedger>,
    config: Arc<ReturnsConfig>,
    concurrency: usize,
) -> Result<Vec<ScenarioRun>, ScenarioError> {
    let scenarios = config.scenarios.clone();
    let count = scenarios.len();

    let runs: Vec<ScenarioRun> = stream::iter(scenarios)
        .map(|scenario| {
            let snapshot = Arc::clone(&snapshot);
            let ledger = Arc::clone(&ledger);
            let config = Arc::clone(&config);
            async move {
                tokio::task::spawn_blocking(move || {
                    evaluate(&snapshot, &ledger, &config, scenario)
                })
                .await
                .map_err(ScenarioError::Worker)
                .and_then(|run| run)
            }
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    tracing::info!(
        scenarios = count,
        concurrency = concurrency.max(1),
        "Scenario batch complete"
    );
    Ok(runs)
}

fn evaluate(
    snapshot: &CapTableSnapshot,
    ledger: &InvestmentLedger,
    config: &ReturnsConfig,
    scenario: ExitScenario,
) -> Result<ScenarioRun, ScenarioError> {
    let waterfall =
        distribute(snapshot, &scenario).map_err(|source| ScenarioError::Waterfall {
            scenario_id: scenario.id.clone(),
            source,
        })?;
    let returns = compute_returns(&waterfall, &scenario, ledger, config);
    Ok(ScenarioRun {
        scenario_id: scenario.id,
        waterfall,
        returns,
    })
}
