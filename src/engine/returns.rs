//! Investor returns (MOIC, IRR, cash-on-cash) from waterfall output.

use crate::domain::{Decimal, ExitScenario, HolderId, ReturnsConfig, ShareClassId};
use crate::engine::irr::{xirr, DatedCashFlow};
use crate::engine::snapshot::CapTableSnapshot;
use crate::engine::waterfall::WaterfallResult;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Capital put into one (holder, class) position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investment {
    pub holder_id: HolderId,
    pub share_class_id: ShareClassId,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investment_date: Option<NaiveDate>,
}

/// Invested amounts keyed by (holder, class).
///
/// Recording the same key twice accumulates the amount and keeps the
/// earliest date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Investment>", into = "Vec<Investment>")]
pub struct InvestmentLedger {
    entries: BTreeMap<(HolderId, ShareClassId), Investment>,
}

impl InvestmentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cost bases and acquisition dates of every issued position.
    pub fn from_snapshot(snapshot: &CapTableSnapshot) -> Self {
        let mut ledger = Self::new();
        for position in snapshot.positions().iter().filter(|p| !p.is_option) {
            if let Some(cost) = position.cost_basis {
                ledger.record(Investment {
                    holder_id: position.holder_id.clone(),
                    share_class_id: position.share_class_id.clone(),
                    amount: cost,
                    investment_date: Some(position.acquisition_date),
                });
            }
        }
        ledger
    }

    pub fn record(&mut self, investment: Investment) {
        let key = (
            investment.holder_id.clone(),
            investment.share_class_id.clone(),
        );
        match self.entries.get_mut(&key) {
            Some(existing) => {
                existing.amount += investment.amount;
                existing.investment_date = match (existing.investment_date, investment.investment_date)
                {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
            }
            None => {
                self.entries.insert(key, investment);
            }
        }
    }

    pub fn get(&self, holder_id: &HolderId, share_class_id: &ShareClassId) -> Option<&Investment> {
        self.entries
            .get(&(holder_id.clone(), share_class_id.clone()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<Investment>> for InvestmentLedger {
    fn from(investments: Vec<Investment>) -> Self {
        let mut ledger = Self::new();
        for investment in investments {
            ledger.record(investment);
        }
        ledger
    }
}

impl From<InvestmentLedger> for Vec<Investment> {
    fn from(ledger: InvestmentLedger) -> Self {
        ledger.entries.into_values().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderReturn {
    pub holder_id: HolderId,
    pub share_class_id: ShareClassId,
    pub investment_amount: Decimal,
    pub total_distribution: Decimal,
    pub moic: Option<Decimal>,
    pub irr: Option<Decimal>,
    /// `(distribution / investment - 1) × 100`; zero without an investment.
    pub cash_on_cash_return: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassReturn {
    pub share_class_id: ShareClassId,
    pub total_investment: Decimal,
    pub total_distribution: Decimal,
    /// Mean MOIC across holders in the class that have one.
    pub moic: Option<Decimal>,
    pub irr: Option<Decimal>,
    pub aggregate_moic: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnsSummary {
    pub total_investment: Decimal,
    pub total_distribution: Decimal,
    pub aggregate_moic: Option<Decimal>,
    pub aggregate_irr: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnsReport {
    pub scenario_id: String,
    pub by_holder: Vec<HolderReturn>,
    pub by_class: Vec<ClassReturn>,
    pub summary: ReturnsSummary,
}

fn mean(values: impl Iterator<Item = Decimal>) -> Option<Decimal> {
    let (sum, count) = values.fold((Decimal::zero(), 0i64), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / Decimal::from(count))
}

/// IRR for a set of investments all realized on `exit_date`.
fn realized_irr(
    investments: &[(NaiveDate, Decimal)],
    exit_date: NaiveDate,
    distribution: Decimal,
) -> Option<Decimal> {
    let mut flows: Vec<DatedCashFlow> = investments
        .iter()
        .map(|(date, amount)| DatedCashFlow::new(*date, -*amount))
        .collect();
    flows.push(DatedCashFlow::new(exit_date, distribution));
    match xirr(&flows) {
        Ok(irr) => Some(irr),
        Err(error) => {
            tracing::warn!(%error, "IRR unavailable");
            None
        }
    }
}

/// Compute returns for every waterfall row.
///
/// MOIC needs `include_moic` and a positive investment. IRR additionally
/// needs `include_irr`, an exit date and an investment date.
pub fn compute_returns(
    waterfall: &WaterfallResult,
    scenario: &ExitScenario,
    ledger: &InvestmentLedger,
    config: &ReturnsConfig,
) -> ReturnsReport {
    let irr_exit = scenario.exit_date.filter(|_| config.include_irr);
    let mut dated_investments: Vec<(NaiveDate, Decimal)> = Vec::new();
    let mut dated_distributions = Decimal::zero();

    let by_holder: Vec<HolderReturn> = waterfall
        .by_holder
        .iter()
        .map(|row| {
            let investment = ledger.get(&row.holder_id, &row.share_class_id);
            let investment_amount = investment.map(|i| i.amount).unwrap_or_default();
            let invested = investment_amount.is_positive();

            let moic = (config.include_moic && invested)
                .then(|| row.total_distribution / investment_amount);

            let investment_date = investment.and_then(|i| i.investment_date);
            let irr = match (irr_exit, investment_date) {
                (Some(exit), Some(start)) if invested => {
                    dated_investments.push((start, investment_amount));
                    dated_distributions += row.total_distribution;
                    realized_irr(&[(start, investment_amount)], exit, row.total_distribution)
                }
                _ => None,
            };

            let cash_on_cash_return = if invested {
                (row.total_distribution / investment_amount - Decimal::one()).as_percent()
            } else {
                Decimal::zero()
            };

            HolderReturn {
                holder_id: row.holder_id.clone(),
                share_class_id: row.share_class_id.clone(),
                investment_amount,
                total_distribution: row.total_distribution,
                moic,
                irr,
                cash_on_cash_return,
            }
        })
        .collect();

    let mut grouped: BTreeMap<&ShareClassId, Vec<&HolderReturn>> = BTreeMap::new();
    for row in &by_holder {
        grouped.entry(&row.share_class_id).or_default().push(row);
    }
    let mut by_class: Vec<ClassReturn> = grouped
        .into_iter()
        .map(|(class_id, rows)| {
            let total_investment: Decimal = rows.iter().map(|r| r.investment_amount).sum();
            let total_distribution: Decimal = rows.iter().map(|r| r.total_distribution).sum();
            ClassReturn {
                share_class_id: class_id.clone(),
                total_investment,
                total_distribution,
                moic: mean(rows.iter().filter_map(|r| r.moic)),
                irr: mean(rows.iter().filter_map(|r| r.irr)),
                aggregate_moic: total_investment
                    .is_positive()
                    .then(|| total_distribution / total_investment),
            }
        })
        .collect();
    by_class.sort_by(|a, b| b.total_distribution.cmp(&a.total_distribution));

    let total_investment: Decimal = by_holder.iter().map(|r| r.investment_amount).sum();
    let total_distribution: Decimal = by_holder.iter().map(|r| r.total_distribution).sum();
    let aggregate_moic = (config.include_moic && total_investment.is_positive())
        .then(|| total_distribution / total_investment);
    let aggregate_irr = match irr_exit {
        Some(exit) if !dated_investments.is_empty() => {
            realized_irr(&dated_investments, exit, dated_distributions)
        }
        _ => None,
    };

    tracing::info!(
        scenario = %scenario.id,
        total_investment = %total_investment,
        total_distribution = %total_distribution,
        aggregate_moic = ?aggregate_moic.map(|m| m.to_canonical_string()),
        "Returns computed"
    );

    ReturnsReport {
        scenario_id: scenario.id.clone(),
        by_holder,
        by_class,
        summary: ReturnsSummary {
            total_investment,
            total_distribution,
            aggregate_moic,
            aggregate_irr,
        },
    }
}
