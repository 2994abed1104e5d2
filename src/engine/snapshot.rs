//! Point-in-time ownership state.
//!
//! A [`SnapshotBuilder`] is the single writer used during replay. Freezing it
//! yields a [`CapTableSnapshot`], which has no mutating methods and can be
//! shared across threads behind an `Arc`.

use crate::domain::{
    Decimal, HolderId, Position, PositionKey, ShareClass, ShareClassId, ShareClassRegistry,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("position not found: holder={holder_id}, class={share_class_id}")]
    PositionNotFound {
        holder_id: HolderId,
        share_class_id: ShareClassId,
    },
    #[error(
        "insufficient shares: holder {holder_id} has {held} of {share_class_id}, \
         trying to reduce by {requested}"
    )]
    InsufficientShares {
        holder_id: HolderId,
        share_class_id: ShareClassId,
        held: Decimal,
        requested: Decimal,
    },
    #[error("option pool exhausted: {available} available, {requested} requested")]
    InsufficientOptionPool {
        available: Decimal,
        requested: Decimal,
    },
}

/// Mutable snapshot under construction.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    as_of_date: NaiveDate,
    positions: BTreeMap<PositionKey, Position>,
    total_shares_outstanding: Decimal,
    option_pool_authorized: Decimal,
    option_pool_available: Decimal,
    share_classes: ShareClassRegistry,
}

impl SnapshotBuilder {
    pub fn new(as_of_date: NaiveDate, share_classes: ShareClassRegistry) -> Self {
        Self {
            as_of_date,
            positions: BTreeMap::new(),
            total_shares_outstanding: Decimal::zero(),
            option_pool_authorized: Decimal::zero(),
            option_pool_available: Decimal::zero(),
            share_classes,
        }
    }

    /// Add a position, accumulating shares and cost basis into an existing
    /// position with the same key.
    pub fn add_or_merge(&mut self, position: Position) {
        if !position.is_option {
            self.total_shares_outstanding += position.shares;
        }

        match self.positions.get_mut(&position.key()) {
            Some(existing) => {
                existing.shares += position.shares;
                if let Some(cost) = position.cost_basis {
                    existing.cost_basis = Some(existing.cost_basis.unwrap_or_default() + cost);
                }
            }
            None => {
                self.positions.insert(position.key(), position);
            }
        }
    }

    /// Remove `shares` from a holder's (non-option) position.
    ///
    /// Cost basis leaves with the shares pro rata; the removed portion is
    /// returned. A position reduced to zero is dropped.
    pub fn reduce(
        &mut self,
        holder_id: &HolderId,
        share_class_id: &ShareClassId,
        shares: Decimal,
    ) -> Result<Option<Decimal>, SnapshotError> {
        let key = PositionKey {
            holder_id: holder_id.clone(),
            share_class_id: share_class_id.clone(),
            is_option: false,
        };
        let position = self
            .positions
            .get_mut(&key)
            .ok_or_else(|| SnapshotError::PositionNotFound {
                holder_id: holder_id.clone(),
                share_class_id: share_class_id.clone(),
            })?;

        if position.shares < shares {
            return Err(SnapshotError::InsufficientShares {
                holder_id: holder_id.clone(),
                share_class_id: share_class_id.clone(),
                held: position.shares,
                requested: shares,
            });
        }

        let removed_cost = position.cost_basis.map(|cost| {
            if shares == position.shares {
                cost
            } else {
                cost * shares.checked_ratio(position.shares)
            }
        });
        if let (Some(cost), Some(removed)) = (position.cost_basis.as_mut(), removed_cost) {
            *cost -= removed;
        }

        position.shares -= shares;
        self.total_shares_outstanding -= shares;

        if position.shares.is_zero() {
            self.positions.remove(&key);
        }
        Ok(removed_cost)
    }

    /// Reserve shares for future grants. Never changes shares outstanding.
    pub fn expand_option_pool(&mut self, shares: Decimal) {
        self.option_pool_authorized += shares;
        self.option_pool_available += shares;
    }

    pub fn draw_option_pool(&mut self, shares: Decimal) -> Result<(), SnapshotError> {
        if shares > self.option_pool_available {
            return Err(SnapshotError::InsufficientOptionPool {
                available: self.option_pool_available,
                requested: shares,
            });
        }
        self.option_pool_available -= shares;
        Ok(())
    }

    pub fn total_shares_outstanding(&self) -> Decimal {
        self.total_shares_outstanding
    }

    pub fn freeze(self) -> CapTableSnapshot {
        CapTableSnapshot {
            as_of_date: self.as_of_date,
            positions: self.positions.into_values().collect(),
            total_shares_outstanding: self.total_shares_outstanding,
            option_pool_authorized: self.option_pool_authorized,
            option_pool_available: self.option_pool_available,
            share_classes: self.share_classes,
        }
    }
}

/// Immutable ownership state as of a date.
///
/// Positions are ordered by (holder, class, is_option).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapTableSnapshot {
    as_of_date: NaiveDate,
    positions: Vec<Position>,
    total_shares_outstanding: Decimal,
    option_pool_authorized: Decimal,
    option_pool_available: Decimal,
    share_classes: ShareClassRegistry,
}

impl CapTableSnapshot {
    pub fn as_of_date(&self) -> NaiveDate {
        self.as_of_date
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn total_shares_outstanding(&self) -> Decimal {
        self.total_shares_outstanding
    }

    pub fn option_pool_authorized(&self) -> Decimal {
        self.option_pool_authorized
    }

    pub fn option_pool_available(&self) -> Decimal {
        self.option_pool_available
    }

    pub fn share_classes(&self) -> &ShareClassRegistry {
        &self.share_classes
    }

    pub fn share_class(&self, id: &ShareClassId) -> Option<&ShareClass> {
        self.share_classes.get(id)
    }

    /// Outstanding shares plus unissued pool shares.
    pub fn fully_diluted_shares(&self) -> Decimal {
        self.total_shares_outstanding + self.option_pool_available
    }

    /// Non-option shares held by `holder_id`.
    pub fn holder_shares(&self, holder_id: &HolderId) -> Decimal {
        self.positions
            .iter()
            .filter(|p| &p.holder_id == holder_id && !p.is_option)
            .map(|p| p.shares)
            .sum()
    }

    /// Fraction of the company held (0.25 = 25%). Zero when there is nothing
    /// to divide by.
    pub fn ownership_percentage(&self, holder_id: &HolderId, fully_diluted: bool) -> Decimal {
        let denominator = if fully_diluted {
            self.fully_diluted_shares()
        } else {
            self.total_shares_outstanding
        };
        self.holder_shares(holder_id).checked_ratio(denominator)
    }

    /// Votes across all issued shares.
    ///
    /// None unless every class with issued shares declares `votes_per_share`.
    pub fn total_voting_shares(&self) -> Option<Decimal> {
        self.positions
            .iter()
            .filter(|p| !p.is_option)
            .map(|p| {
                self.share_class(&p.share_class_id)
                    .and_then(|class| class.votes_per_share)
                    .map(|votes| p.shares * votes)
            })
            .sum()
    }

    /// Distinct holders, sorted.
    pub fn holders(&self) -> Vec<&HolderId> {
        self.positions
            .iter()
            .map(|p| &p.holder_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn positions_by_holder(&self, holder_id: &HolderId) -> Vec<&Position> {
        self.positions
            .iter()
            .filter(|p| &p.holder_id == holder_id)
            .collect()
    }

    pub fn positions_by_class(&self, share_class_id: &ShareClassId) -> Vec<&Position> {
        self.positions
            .iter()
            .filter(|p| &p.share_class_id == share_class_id)
            .collect()
    }

    /// Hex SHA-256 over the canonical form of every position and total.
    ///
    /// Equal snapshots always produce equal fingerprints.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.as_of_date.to_string());
        for position in &self.positions {
            hasher.update(b"|");
            hasher.update(position.holder_id.as_str());
            hasher.update(b"/");
            hasher.update(position.share_class_id.as_str());
            hasher.update(if position.is_option { b"O" } else { b"S" });
            hasher.update(position.shares.to_canonical_string());
            match position.cost_basis {
                Some(cost) => hasher.update(cost.to_canonical_string()),
                None => hasher.update(b"-"),
            }
            hasher.update(position.acquisition_date.to_string());
        }
        hasher.update(b"#");
        hasher.update(self.total_shares_outstanding.to_canonical_string());
        hasher.update(self.option_pool_authorized.to_canonical_string());
        hasher.update(self.option_pool_available.to_canonical_string());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn holder(s: &str) -> HolderId {
        HolderId::new(s).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn common_position(who: &str, shares: &str, cost: Option<&str>) -> Position {
        Position::shares(holder(who), ShareClassId::common(), d(shares), date(), cost.map(d))
    }

    fn builder() -> SnapshotBuilder {
        let registry: ShareClassRegistry =
            std::iter::once(ShareClass::common(ShareClassId::common(), "Common")).collect();
        SnapshotBuilder::new(date(), registry)
    }

    #[test]
    fn test_merge_accumulates_shares_and_cost() {
        let mut b = builder();
        b.add_or_merge(common_position("founder_alice", "100", Some("10")));
        b.add_or_merge(common_position("founder_alice", "50", None));
        b.add_or_merge(common_position("founder_alice", "50", Some("5")));
        let snapshot = b.freeze();

        assert_eq!(snapshot.positions().len(), 1);
        assert_eq!(snapshot.positions()[0].shares, d("200"));
        assert_eq!(snapshot.positions()[0].cost_basis, Some(d("15")));
        assert_eq!(snapshot.total_shares_outstanding(), d("200"));
    }

    #[test]
    fn test_options_do_not_count_as_outstanding() {
        let mut b = builder();
        let mut warrant = common_position("lender", "1000", None);
        warrant.is_option = true;
        b.add_or_merge(warrant);
        b.add_or_merge(common_position("founder_alice", "9000", None));
        let snapshot = b.freeze();

        assert_eq!(snapshot.positions().len(), 2);
        assert_eq!(snapshot.total_shares_outstanding(), d("9000"));
        assert_eq!(snapshot.holder_shares(&holder("lender")), Decimal::zero());
    }

    #[test]
    fn test_reduce_errors_and_removal() {
        let mut b = builder();
        b.add_or_merge(common_position("founder_alice", "100", Some("40")));

        assert!(matches!(
            b.reduce(&holder("nobody"), &ShareClassId::common(), d("1")),
            Err(SnapshotError::PositionNotFound { .. })
        ));
        assert!(matches!(
            b.reduce(&holder("founder_alice"), &ShareClassId::common(), d("101")),
            Err(SnapshotError::InsufficientShares { .. })
        ));

        let removed = b
            .reduce(&holder("founder_alice"), &ShareClassId::common(), d("25"))
            .unwrap();
        assert_eq!(removed, Some(d("10")));
        let removed = b
            .reduce(&holder("founder_alice"), &ShareClassId::common(), d("75"))
            .unwrap();
        assert_eq!(removed, Some(d("30")));

        let snapshot = b.freeze();
        assert!(snapshot.positions().is_empty());
        assert_eq!(snapshot.total_shares_outstanding(), Decimal::zero());
    }

    #[test]
    fn test_option_pool_accounting() {
        let mut b = builder();
        b.expand_option_pool(d("1000"));
        b.draw_option_pool(d("400")).unwrap();
        assert!(matches!(
            b.draw_option_pool(d("601")),
            Err(SnapshotError::InsufficientOptionPool { .. })
        ));
        let snapshot = b.freeze();
        assert_eq!(snapshot.option_pool_authorized(), d("1000"));
        assert_eq!(snapshot.option_pool_available(), d("600"));
        assert_eq!(snapshot.total_shares_outstanding(), Decimal::zero());
        assert_eq!(snapshot.fully_diluted_shares(), d("600"));
    }

    #[test]
    fn test_ownership_percentage() {
        let mut b = builder();
        b.add_or_merge(common_position("founder_alice", "5000000", None));
        b.add_or_merge(common_position("founder_bob", "15000000", None));
        b.expand_option_pool(d("4000000"));
        let snapshot = b.freeze();

        let alice = holder("founder_alice");
        assert_eq!(snapshot.ownership_percentage(&alice, false), d("0.25"));
        assert_eq!(
            snapshot.ownership_percentage(&alice, true),
            d("5000000") / d("24000000")
        );
    }

    #[test]
    fn test_ownership_of_empty_snapshot_is_zero() {
        let snapshot = builder().freeze();
        assert_eq!(
            snapshot.ownership_percentage(&holder("founder_alice"), true),
            Decimal::zero()
        );
    }

    #[test]
    fn test_total_voting_shares_requires_votes_everywhere() {
        let mut registry = ShareClassRegistry::new();
        registry
            .insert(
                ShareClass::common(ShareClassId::common(), "Common")
                    .with_votes_per_share(Decimal::one()),
            )
            .unwrap();
        let mut b = SnapshotBuilder::new(date(), registry.clone());
        b.add_or_merge(common_position("founder_alice", "100", None));
        assert_eq!(b.freeze().total_voting_shares(), Some(d("100")));

        registry
            .insert(ShareClass::common(ShareClassId::new("class_b").unwrap(), "Class B"))
            .unwrap();
        let mut b = SnapshotBuilder::new(date(), registry);
        b.add_or_merge(common_position("founder_alice", "100", None));
        b.add_or_merge(Position::shares(
            holder("founder_bob"),
            ShareClassId::new("class_b").unwrap(),
            d("10"),
            date(),
            None,
        ));
        assert_eq!(b.freeze().total_voting_shares(), None);
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let mut a = builder();
        a.add_or_merge(common_position("founder_alice", "100", None));
        let mut b = builder();
        b.add_or_merge(common_position("founder_alice", "100", None));
        let mut c = builder();
        c.add_or_merge(common_position("founder_alice", "101", None));

        let (a, b, c) = (a.freeze(), b.freeze(), c.freeze());
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }
}
