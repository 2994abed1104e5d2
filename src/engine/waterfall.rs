//! Exit waterfall: distribute net proceeds by seniority, participation and
//! as-converted ownership.
//!
//! Order of operations:
//! 1. classify every issued position (participating, preference, convert, common)
//! 2. pay liquidation preferences tier by tier, rank 0 first, pro rata within a tier
//! 3. pay participation to participating preferred against fully diluted shares
//! 4. pay everything left to common plus converting preferred
//!
//! Computed shares of a pool are rounded to `AMOUNT_SCALE` places and every
//! pro-rata split hands its rounding remainder to the last member, so the sum
//! of all distributions equals net proceeds exactly.

use crate::domain::{
    Decimal, ExitScenario, HolderId, Position, ShareClass, ShareClassId, ValidationError,
};
use crate::engine::snapshot::CapTableSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Decimal places kept on computed shares of a pool.
pub const AMOUNT_SCALE: u32 = 10;

const COMMON_STEP_NAME: &str = "Distribution to Common (As-Converted)";
const PARTICIPATION_STEP_NAME: &str = "Participation Rights (Participating Preferred)";
const RESIDUAL_PARTICIPATION_STEP_NAME: &str = "Residual to Participating Preferred";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaterfallError {
    #[error("invalid exit scenario: {0}")]
    InvalidScenario(#[from] ValidationError),
    #[error("holder {holder_id} holds shares of unknown class {share_class_id}")]
    UnknownShareClass {
        holder_id: HolderId,
        share_class_id: ShareClassId,
    },
}

/// What a non-participating preferred holder does at exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceChoice {
    Preference,
    Convert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderDistribution {
    pub holder_id: HolderId,
    pub share_class_id: ShareClassId,
    pub shares: Decimal,
    /// Percent of fully diluted shares (25 = 25%).
    pub ownership_pct: Decimal,
    pub liquidation_preference_amount: Decimal,
    pub participation_amount: Decimal,
    pub common_distribution_amount: Decimal,
    pub total_distribution: Decimal,
    /// Percent of net proceeds (25 = 25%).
    pub distribution_pct: Decimal,
    /// Null for holders with no preference to weigh.
    #[serde(default)]
    pub preference_choice: Option<PreferenceChoice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDistribution {
    pub share_class_id: ShareClassId,
    pub share_class_name: String,
    pub total_distribution: Decimal,
    pub distribution_pct: Decimal,
}

/// One audited movement of money in the waterfall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterfallStep {
    pub step: u32,
    pub step_name: String,
    #[serde(default)]
    pub share_class_id: Option<ShareClassId>,
    pub amount_available: Decimal,
    pub amount_distributed: Decimal,
    pub amount_remaining: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterfallResult {
    pub scenario_id: String,
    pub net_proceeds: Decimal,
    pub total_distributed: Decimal,
    /// Proceeds no holder could claim. Zero unless the cap table has no
    /// common, converting or uncapped participating shares.
    pub unallocated: Decimal,
    /// Every position, including unexercised options and warrants with zero
    /// amounts. Ordered by total distribution, largest first.
    pub by_holder: Vec<HolderDistribution>,
    /// Classes with issued shares only.
    pub by_class: Vec<ClassDistribution>,
    pub steps: Vec<WaterfallStep>,
    pub fingerprint: String,
}

impl WaterfallResult {
    pub fn holder_total(&self, holder_id: &HolderId) -> Decimal {
        self.by_holder
            .iter()
            .filter(|row| &row.holder_id == holder_id)
            .map(|row| row.total_distribution)
            .sum()
    }

    pub fn class_total(&self, share_class_id: &ShareClassId) -> Decimal {
        self.by_class
            .iter()
            .filter(|row| &row.share_class_id == share_class_id)
            .map(|row| row.total_distribution)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Treatment {
    /// Takes the preference, then participates up to an optional cap.
    Participating { cap_multiple: Option<Decimal> },
    /// Non-participating preferred that keeps its preference.
    Preference,
    /// Non-participating preferred that converts to common.
    Convert,
    Common,
}

#[derive(Debug, Clone, Default)]
struct Allocation {
    preference: Decimal,
    participation: Decimal,
    common: Decimal,
    capped: bool,
}

impl Allocation {
    fn total(&self) -> Decimal {
        self.preference + self.participation + self.common
    }
}

struct Claimant<'a> {
    position: &'a Position,
    class: &'a ShareClass,
    treatment: Treatment,
    allocation: Allocation,
}

impl Claimant<'_> {
    /// `(cost_basis ?? shares) × multiple`; zero without a preference.
    fn preference_claim(&self) -> Decimal {
        match &self.class.liquidation_preference {
            Some(pref) => {
                self.position.cost_basis.unwrap_or(self.position.shares) * pref.multiple
            }
            None => Decimal::zero(),
        }
    }

    /// Base that a participation cap multiplies.
    fn original_investment(&self) -> Decimal {
        match (self.position.cost_basis, &self.class.liquidation_preference) {
            (Some(cost), _) => cost,
            (None, Some(pref)) => self.position.shares * pref.multiple,
            (None, None) => self.position.shares,
        }
    }

    fn preference_choice(&self) -> Option<PreferenceChoice> {
        match self.treatment {
            Treatment::Preference => Some(PreferenceChoice::Preference),
            Treatment::Convert => Some(PreferenceChoice::Convert),
            _ => None,
        }
    }
}

/// Split a non-negative `amount` pro rata by `weights`. The last non-zero
/// weight absorbs the rounding remainder so the parts sum to `amount` exactly,
/// and no part is negative.
pub fn split_pro_rata(amount: Decimal, weights: &[Decimal]) -> Vec<Decimal> {
    let total: Decimal = weights.iter().sum();
    let mut parts = vec![Decimal::zero(); weights.len()];
    if total.is_zero() || amount.is_zero() {
        return parts;
    }
    let Some(last) = weights.iter().rposition(|w| !w.is_zero()) else {
        return parts;
    };

    let mut assigned = Decimal::zero();
    for (i, weight) in weights.iter().enumerate().take(last) {
        // Ratio first: `amount * weight` can overflow where the share cannot.
        let share = (amount * weight.checked_ratio(total)).round_dp(AMOUNT_SCALE);
        parts[i] = share.min(amount - assigned);
        assigned += parts[i];
    }
    parts[last] = amount - assigned;
    parts
}

struct WaterfallRun<'a> {
    snapshot: &'a CapTableSnapshot,
    claimants: Vec<Claimant<'a>>,
    steps: Vec<WaterfallStep>,
    remaining: Decimal,
}

impl<'a> WaterfallRun<'a> {
    fn classify(
        snapshot: &'a CapTableSnapshot,
        net_proceeds: Decimal,
    ) -> Result<Self, WaterfallError> {
        let per_share = net_proceeds.checked_ratio(snapshot.fully_diluted_shares());
        let mut claimants = Vec::new();

        for position in snapshot.positions().iter().filter(|p| !p.is_option) {
            let class = snapshot.share_class(&position.share_class_id).ok_or_else(|| {
                WaterfallError::UnknownShareClass {
                    holder_id: position.holder_id.clone(),
                    share_class_id: position.share_class_id.clone(),
                }
            })?;

            let participation = class.participation_rights.as_ref();
            let mut claimant = Claimant {
                position,
                class,
                treatment: Treatment::Common,
                allocation: Allocation::default(),
            };

            claimant.treatment = if participation.is_some_and(|p| p.participates()) {
                Treatment::Participating {
                    cap_multiple: participation.and_then(|p| p.cap_multiple()),
                }
            } else if class.liquidation_preference.is_some() {
                // Single pass: compares against all net proceeds, before any
                // preference has been paid.
                let as_converted = position.shares * per_share;
                if claimant.preference_claim() > as_converted {
                    Treatment::Preference
                } else {
                    Treatment::Convert
                }
            } else {
                Treatment::Common
            };
            claimants.push(claimant);
        }

        Ok(Self {
            snapshot,
            claimants,
            steps: Vec::new(),
            remaining: net_proceeds,
        })
    }

    fn record_step(
        &mut self,
        step_name: String,
        share_class_id: Option<ShareClassId>,
        distributed: Decimal,
    ) {
        let available = self.remaining;
        self.remaining -= distributed;
        self.steps.push(WaterfallStep {
            step: self.steps.len() as u32 + 1,
            step_name,
            share_class_id,
            amount_available: available,
            amount_distributed: distributed,
            amount_remaining: self.remaining,
        });
    }

    fn distribute_preferences(&mut self) {
        let mut tiers: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (i, claimant) in self.claimants.iter().enumerate() {
            let takes_preference = matches!(
                claimant.treatment,
                Treatment::Preference | Treatment::Participating { .. }
            );
            if let (true, Some(rank)) = (takes_preference, claimant.class.seniority_rank()) {
                tiers.entry(rank).or_default().push(i);
            }
        }

        for (rank, members) in tiers {
            if !self.remaining.is_positive() {
                break;
            }
            let claims: Vec<Decimal> = members
                .iter()
                .map(|&i| self.claimants[i].preference_claim())
                .collect();
            let tier_claim: Decimal = claims.iter().sum();
            let tier_paid = self.remaining.min(tier_claim);

            for (&i, part) in members.iter().zip(split_pro_rata(tier_paid, &claims)) {
                self.claimants[i].allocation.preference += part;
            }

            let lead = self.claimants[members[0]].class;
            tracing::debug!(
                rank,
                members = members.len(),
                claim = %tier_claim,
                paid = %tier_paid,
                "Paid preference tier"
            );
            self.record_step(
                format!("Liquidation Preference - {} (Rank {})", lead.name, rank),
                Some(lead.id.clone()),
                tier_paid,
            );
        }
    }

    fn distribute_participation(&mut self) {
        let fully_diluted = self.snapshot.fully_diluted_shares();
        if !self.remaining.is_positive() || fully_diluted.is_zero() {
            return;
        }

        let members: Vec<usize> = self
            .claimants
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c.treatment, Treatment::Participating { .. }))
            .map(|(i, _)| i)
            .collect();
        if members.is_empty() {
            return;
        }

        // Non-participating shares hold the last weight, so the uncapped
        // pieces sum to exactly `pool`.
        let mut weights: Vec<Decimal> = members
            .iter()
            .map(|&i| self.claimants[i].position.shares)
            .collect();
        let participating: Decimal = weights.iter().sum();
        weights.push((fully_diluted - participating).max(Decimal::zero()));

        let pool = self.remaining;
        let mut paid = Decimal::zero();
        for (&i, pro_rata) in members.iter().zip(split_pro_rata(pool, &weights)) {
            let claimant = &mut self.claimants[i];
            let Treatment::Participating { cap_multiple } = claimant.treatment else {
                continue;
            };
            let amount = match cap_multiple {
                Some(cap) => {
                    let cap_amount = cap * claimant.original_investment();
                    let headroom =
                        (cap_amount - claimant.allocation.preference).max(Decimal::zero());
                    if pro_rata >= headroom {
                        claimant.allocation.capped = true;
                    }
                    pro_rata.min(headroom)
                }
                None => pro_rata,
            };
            claimant.allocation.participation += amount;
            paid += amount;
        }

        if paid.is_positive() {
            self.record_step(PARTICIPATION_STEP_NAME.to_string(), None, paid);
        }
    }

    fn distribute_residual(&mut self) -> Decimal {
        if !self.remaining.is_positive() {
            return Decimal::zero();
        }

        let eligible: Vec<usize> = self
            .claimants
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c.treatment, Treatment::Common | Treatment::Convert))
            .map(|(i, _)| i)
            .collect();
        // 1:1 as-converted.
        let weights: Vec<Decimal> = eligible
            .iter()
            .map(|&i| self.claimants[i].position.shares)
            .collect();

        if weights.iter().any(Decimal::is_positive) {
            let amount = self.remaining;
            for (&i, part) in eligible.iter().zip(split_pro_rata(amount, &weights)) {
                self.claimants[i].allocation.common += part;
            }
            self.record_step(
                COMMON_STEP_NAME.to_string(),
                Some(ShareClassId::common()),
                amount,
            );
            return Decimal::zero();
        }

        let uncapped: Vec<usize> = self
            .claimants
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                matches!(c.treatment, Treatment::Participating { .. }) && !c.allocation.capped
            })
            .map(|(i, _)| i)
            .collect();
        let weights: Vec<Decimal> = uncapped
            .iter()
            .map(|&i| self.claimants[i].position.shares)
            .collect();

        if weights.iter().any(Decimal::is_positive) {
            let amount = self.remaining;
            for (&i, part) in uncapped.iter().zip(split_pro_rata(amount, &weights)) {
                self.claimants[i].allocation.participation += part;
            }
            self.record_step(RESIDUAL_PARTICIPATION_STEP_NAME.to_string(), None, amount);
            return Decimal::zero();
        }

        let unallocated = self.remaining;
        tracing::warn!(
            unallocated = %unallocated,
            "No holder can claim residual proceeds"
        );
        unallocated
    }

    fn into_result(
        self,
        scenario: &ExitScenario,
        net_proceeds: Decimal,
        unallocated: Decimal,
    ) -> WaterfallResult {
        let fully_diluted = self.snapshot.fully_diluted_shares();

        let mut by_holder: Vec<HolderDistribution> = self
            .claimants
            .iter()
            .map(|c| {
                let total = c.allocation.total();
                HolderDistribution {
                    holder_id: c.position.holder_id.clone(),
                    share_class_id: c.position.share_class_id.clone(),
                    shares: c.position.shares,
                    ownership_pct: c.position.shares.checked_ratio(fully_diluted).as_percent(),
                    liquidation_preference_amount: c.allocation.preference,
                    participation_amount: c.allocation.participation,
                    common_distribution_amount: c.allocation.common,
                    total_distribution: total,
                    distribution_pct: total.checked_ratio(net_proceeds).as_percent(),
                    preference_choice: c.preference_choice(),
                }
            })
            .collect();
        let mut class_totals: BTreeMap<&ShareClassId, (Decimal, Decimal)> = BTreeMap::new();
        for row in &by_holder {
            let entry = class_totals.entry(&row.share_class_id).or_default();
            entry.0 += row.total_distribution;
            entry.1 += row.distribution_pct;
        }
        let mut by_class: Vec<ClassDistribution> = class_totals
            .into_iter()
            .map(|(id, (total, pct))| ClassDistribution {
                share_class_id: id.clone(),
                share_class_name: self
                    .snapshot
                    .share_class(id)
                    .map(|class| class.name.clone())
                    .unwrap_or_else(|| id.to_string()),
                total_distribution: total,
                distribution_pct: pct,
            })
            .collect();
        by_class.sort_by(|a, b| b.total_distribution.cmp(&a.total_distribution));

        by_holder.extend(
            self.snapshot
                .positions()
                .iter()
                .filter(|p| p.is_option)
                .map(|p| unexercised_row(p, fully_diluted)),
        );
        by_holder.sort_by(|a, b| {
            b.total_distribution
                .cmp(&a.total_distribution)
                .then_with(|| a.holder_id.cmp(&b.holder_id))
                .then_with(|| a.share_class_id.cmp(&b.share_class_id))
        });

        let total_distributed: Decimal = by_holder.iter().map(|row| row.total_distribution).sum();
        let fingerprint = fingerprint(&scenario.id, net_proceeds, &by_holder, &self.steps);

        WaterfallResult {
            scenario_id: scenario.id.clone(),
            net_proceeds,
            total_distributed,
            unallocated,
            by_holder,
            by_class,
            steps: self.steps,
            fingerprint,
        }
    }
}

/// Options and warrants take nothing until exercised.
fn unexercised_row(position: &Position, fully_diluted: Decimal) -> HolderDistribution {
    HolderDistribution {
        holder_id: position.holder_id.clone(),
        share_class_id: position.share_class_id.clone(),
        shares: position.shares,
        ownership_pct: position.shares.checked_ratio(fully_diluted).as_percent(),
        liquidation_preference_amount: Decimal::zero(),
        participation_amount: Decimal::zero(),
        common_distribution_amount: Decimal::zero(),
        total_distribution: Decimal::zero(),
        distribution_pct: Decimal::zero(),
        preference_choice: None,
    }
}

fn fingerprint(
    scenario_id: &str,
    net_proceeds: Decimal,
    by_holder: &[HolderDistribution],
    steps: &[WaterfallStep],
) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(scenario_id);
    hasher.update(net_proceeds.to_canonical_string());
    for row in by_holder {
        hasher.update(b"|");
        hasher.update(row.holder_id.as_str());
        hasher.update(b"/");
        hasher.update(row.share_class_id.as_str());
        hasher.update(row.liquidation_preference_amount.to_canonical_string());
        hasher.update(b",");
        hasher.update(row.participation_amount.to_canonical_string());
        hasher.update(b",");
        hasher.update(row.common_distribution_amount.to_canonical_string());
    }
    for step in steps {
        hasher.update(b"#");
        hasher.update(step.step_name.as_bytes());
        hasher.update(step.amount_distributed.to_canonical_string());
    }
    hex::encode(hasher.finalize())
}

/// Run the waterfall for one exit scenario against a snapshot.
pub fn distribute(
    snapshot: &CapTableSnapshot,
    scenario: &ExitScenario,
) -> Result<WaterfallResult, WaterfallError> {
    scenario.validate()?;
    let net_proceeds = scenario.net_proceeds();

    let mut run = WaterfallRun::classify(snapshot, net_proceeds)?;
    run.distribute_preferences();
    run.distribute_participation();
    let unallocated = run.distribute_residual();
    let result = run.into_result(scenario, net_proceeds, unallocated);

    tracing::info!(
        scenario = %result.scenario_id,
        net_proceeds = %result.net_proceeds,
        distributed = %result.total_distributed,
        steps = result.steps.len(),
        "Waterfall complete"
    );
    Ok(result)
}
