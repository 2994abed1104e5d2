//! Ownership tables: per position, per class and a one-row summary.

use crate::domain::{Decimal, HolderId, ShareClassId, ShareType};
use crate::engine::snapshot::CapTableSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRow {
    pub holder_id: HolderId,
    pub share_class_id: ShareClassId,
    pub share_class_name: String,
    pub shares: Decimal,
    /// Percent of fully diluted shares.
    pub ownership_pct: Decimal,
    pub liquidation_preference_multiple: Option<Decimal>,
    /// Absent when the class declares no votes per share.
    pub votes: Option<Decimal>,
    pub voting_pct: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassOwnershipRow {
    pub share_class_id: ShareClassId,
    pub share_class_name: String,
    pub shares: Decimal,
    pub ownership_pct: Decimal,
    pub holders_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipSummary {
    pub total_shares: Decimal,
    pub total_holders: usize,
    pub total_share_classes: usize,
    pub common_shares: Decimal,
    pub preferred_shares: Decimal,
    pub option_pool_shares: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipReport {
    pub as_of_date: chrono::NaiveDate,
    pub ownership: Vec<OwnershipRow>,
    pub by_class: Vec<ClassOwnershipRow>,
    pub summary: OwnershipSummary,
}

/// Build ownership tables for every issued position. Positions in classes
/// missing from the registry are left out.
pub fn ownership_report(snapshot: &CapTableSnapshot) -> OwnershipReport {
    let fully_diluted = snapshot.fully_diluted_shares();
    let total_votes = snapshot.total_voting_shares();

    let mut ownership = Vec::new();
    let mut common_shares = Decimal::zero();
    let mut preferred_shares = Decimal::zero();

    for position in snapshot.positions().iter().filter(|p| !p.is_option) {
        let Some(class) = snapshot.share_class(&position.share_class_id) else {
            tracing::warn!(
                holder = %position.holder_id,
                share_class = %position.share_class_id,
                "Position in unknown share class left out of ownership report"
            );
            continue;
        };

        match class.share_type {
            ShareType::Common => common_shares += position.shares,
            ShareType::Preferred => preferred_shares += position.shares,
            ShareType::Option | ShareType::Warrant => {}
        }

        let votes = class.votes_per_share.map(|v| position.shares * v);
        ownership.push(OwnershipRow {
            holder_id: position.holder_id.clone(),
            share_class_id: position.share_class_id.clone(),
            share_class_name: class.name.clone(),
            shares: position.shares,
            ownership_pct: position.shares.checked_ratio(fully_diluted).as_percent(),
            liquidation_preference_multiple: class
                .liquidation_preference
                .as_ref()
                .map(|pref| pref.multiple),
            votes,
            voting_pct: votes
                .zip(total_votes)
                .map(|(v, total)| v.checked_ratio(total).as_percent()),
        });
    }
    ownership.sort_by(|a, b| b.ownership_pct.cmp(&a.ownership_pct));

    let mut grouped: BTreeMap<&ShareClassId, (String, Decimal, Decimal, BTreeSet<&HolderId>)> =
        BTreeMap::new();
    for row in &ownership {
        let entry = grouped.entry(&row.share_class_id).or_insert_with(|| {
            (
                row.share_class_name.clone(),
                Decimal::zero(),
                Decimal::zero(),
                BTreeSet::new(),
            )
        });
        entry.1 += row.shares;
        entry.2 += row.ownership_pct;
        entry.3.insert(&row.holder_id);
    }
    let mut by_class: Vec<ClassOwnershipRow> = grouped
        .into_iter()
        .map(|(id, (name, shares, pct, holders))| ClassOwnershipRow {
            share_class_id: id.clone(),
            share_class_name: name,
            shares,
            ownership_pct: pct,
            holders_count: holders.len(),
        })
        .collect();
    by_class.sort_by(|a, b| b.ownership_pct.cmp(&a.ownership_pct));

    let total_holders = ownership
        .iter()
        .map(|row| &row.holder_id)
        .collect::<BTreeSet<_>>()
        .len();

    OwnershipReport {
        as_of_date: snapshot.as_of_date(),
        summary: OwnershipSummary {
            total_shares: fully_diluted,
            total_holders,
            total_share_classes: snapshot.share_classes().len(),
            common_shares,
            preferred_shares,
            option_pool_shares: snapshot.option_pool_available(),
        },
        ownership,
        by_class,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        LiquidationPreference, Participation, Position, ShareClass, ShareClassRegistry,
    };
    use crate::engine::snapshot::SnapshotBuilder;
    use chrono::NaiveDate;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_ownership_report_tables() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let series_a = ShareClassId::new("series_a").unwrap();
        let mut registry = ShareClassRegistry::new();
        registry
            .insert(ShareClass::common(ShareClassId::common(), "Common"))
            .unwrap();
        registry
            .insert(
                ShareClass::preferred(
                    series_a.clone(),
                    "Series A",
                    LiquidationPreference::new(Decimal::one(), 0),
                    Participation::NonParticipating,
                )
                .unwrap(),
            )
            .unwrap();

        let mut builder = SnapshotBuilder::new(date, registry);
        for (holder, class, shares) in [
            ("founder_alice", ShareClassId::common(), "6000000"),
            ("founder_bob", ShareClassId::common(), "2000000"),
            ("acme_vc", series_a.clone(), "1000000"),
        ] {
            builder.add_or_merge(Position::shares(
                HolderId::new(holder).unwrap(),
                class,
                d(shares),
                date,
                None,
            ));
        }
        builder.expand_option_pool(d("1000000"));
        let report = ownership_report(&builder.freeze());

        assert_eq!(report.ownership.len(), 3);
        assert_eq!(report.ownership[0].holder_id.as_str(), "founder_alice");
        assert_eq!(report.ownership[0].ownership_pct, d("60"));
        assert_eq!(report.ownership[0].votes, None);

        assert_eq!(report.by_class[0].share_class_id, ShareClassId::common());
        assert_eq!(report.by_class[0].holders_count, 2);
        assert_eq!(report.by_class[0].ownership_pct, d("80"));

        assert_eq!(report.summary.total_shares, d("10000000"));
        assert_eq!(report.summary.total_holders, 3);
        assert_eq!(report.summary.preferred_shares, d("1000000"));
        assert_eq!(report.summary.option_pool_shares, d("1000000"));
    }
}
