use captable::domain::{
    Decimal, ExitScenario, ExitType, HolderId, LiquidationPreference, Participation, Percentage,
    Position, ShareClass, ShareClassId, ShareClassRegistry,
};
use captable::engine::{
    distribute, CapTableSnapshot, PreferenceChoice, SnapshotBuilder, WaterfallError,
};
use chrono::NaiveDate;
use std::str::FromStr;

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn holder(id: &str) -> HolderId {
    HolderId::new(id).unwrap()
}

fn class(id: &str) -> ShareClassId {
    ShareClassId::new(id).unwrap()
}

fn pct(s: &str) -> Option<Percentage> {
    Some(Percentage::new(d(s)).unwrap())
}

fn preferred(id: &str, rank: u32, participation: Participation) -> ShareClass {
    ShareClass::preferred(
        class(id),
        format!("{} Preferred", id),
        LiquidationPreference::new(Decimal::one(), rank),
        participation,
    )
    .unwrap()
}

/// Build a snapshot from (holder, class, shares, cost) rows.
fn snapshot(
    classes: Vec<ShareClass>,
    rows: &[(&str, &str, &str, Option<&str>)],
    pool: &str,
) -> CapTableSnapshot {
    let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let mut registry = ShareClassRegistry::new();
    registry
        .insert(ShareClass::common(ShareClassId::common(), "Common"))
        .unwrap();
    for share_class in classes {
        registry.insert(share_class).unwrap();
    }

    let mut builder = SnapshotBuilder::new(date, registry);
    for (who, class_id, shares, cost) in rows {
        builder.add_or_merge(Position::shares(
            holder(who),
            class(class_id),
            d(shares),
            date,
            cost.map(d),
        ));
    }
    builder.expand_option_pool(d(pool));
    builder.freeze()
}

fn scenario(exit_value: &str) -> ExitScenario {
    ExitScenario::acquisition("exit", d(exit_value))
}

/// Founders hold 40M common; the investor holds 10M of `class_id` (20% FD).
fn founders_plus_investor(investor_class: ShareClass) -> CapTableSnapshot {
    let class_id = investor_class.id.to_string();
    snapshot(
        vec![investor_class],
        &[
            ("founders", "common", "40000000", None),
            ("acme_vc", class_id.as_str(), "10000000", Some("10000000")),
        ],
        "0",
    )
}

#[test]
fn test_sole_common_holder_takes_everything() {
    let snap = snapshot(vec![], &[("founders", "common", "8000000", None)], "0");
    let result = distribute(&snap, &scenario("50000000")).unwrap();

    assert_eq!(result.by_holder.len(), 1);
    assert_eq!(result.by_holder[0].total_distribution, d("50000000"));
    assert_eq!(result.by_holder[0].distribution_pct, d("100"));
    assert_eq!(result.by_holder[0].common_distribution_amount, d("50000000"));
    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.steps[0].step_name, "Distribution to Common (As-Converted)");
}

#[test]
fn test_non_participating_takes_preference_when_larger() {
    let snap = founders_plus_investor(preferred("series_a", 0, Participation::NonParticipating));
    let result = distribute(&snap, &scenario("15000000")).unwrap();

    let acme = &result.by_holder[0];
    assert_eq!(acme.holder_id.as_str(), "acme_vc");
    assert_eq!(acme.preference_choice, Some(PreferenceChoice::Preference));
    assert_eq!(acme.liquidation_preference_amount, d("10000000"));
    assert_eq!(acme.total_distribution, d("10000000"));
    assert_eq!(result.holder_total(&holder("founders")), d("5000000"));

    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[0].step, 1);
    assert_eq!(
        result.steps[0].step_name,
        "Liquidation Preference - series_a Preferred (Rank 0)"
    );
    assert_eq!(result.steps[0].share_class_id, Some(class("series_a")));
    assert_eq!(result.steps[0].amount_available, d("15000000"));
    assert_eq!(result.steps[0].amount_remaining, d("5000000"));
    assert_eq!(result.steps[1].amount_distributed, d("5000000"));
    assert_eq!(result.steps[1].amount_remaining, Decimal::zero());
}

#[test]
fn test_non_participating_converts_when_as_converted_is_larger() {
    let snap = founders_plus_investor(preferred("series_a", 0, Participation::NonParticipating));
    let result = distribute(&snap, &scenario("100000000")).unwrap();

    let acme = result
        .by_holder
        .iter()
        .find(|row| row.holder_id.as_str() == "acme_vc")
        .unwrap();
    assert_eq!(acme.preference_choice, Some(PreferenceChoice::Convert));
    assert_eq!(acme.liquidation_preference_amount, Decimal::zero());
    assert_eq!(acme.common_distribution_amount, d("20000000"));
    // max(preference 10M, as-converted 20M)
    assert_eq!(acme.total_distribution, d("20000000"));
    assert_eq!(result.holder_total(&holder("founders")), d("80000000"));
}

#[test]
fn test_participating_double_dips() {
    let snap = founders_plus_investor(preferred("series_a", 0, Participation::Participating));
    let result = distribute(&snap, &scenario("100000000")).unwrap();

    // Sorted by total: founders first.
    assert_eq!(result.by_holder[0].holder_id.as_str(), "founders");
    let acme = &result.by_holder[1];
    assert_eq!(acme.liquidation_preference_amount, d("10000000"));
    assert_eq!(acme.participation_amount, d("18000000"));
    assert_eq!(acme.total_distribution, d("28000000"));
    assert_eq!(result.holder_total(&holder("founders")), d("72000000"));
    assert!(result
        .steps
        .iter()
        .any(|s| s.step_name == "Participation Rights (Participating Preferred)"
            && s.amount_distributed == d("18000000")));
}

#[test]
fn test_capped_participation_stops_at_cap() {
    let snap = founders_plus_investor(preferred(
        "series_a",
        0,
        Participation::CappedParticipating {
            cap_multiple: d("3"),
        },
    ));
    let result = distribute(&snap, &scenario("200000000")).unwrap();

    let acme = result
        .by_holder
        .iter()
        .find(|row| row.holder_id.as_str() == "acme_vc")
        .unwrap();
    assert_eq!(acme.liquidation_preference_amount, d("10000000"));
    assert_eq!(acme.participation_amount, d("20000000"));
    assert_eq!(acme.common_distribution_amount, Decimal::zero());
    assert_eq!(acme.total_distribution, d("30000000"));
    assert_eq!(result.holder_total(&holder("founders")), d("170000000"));
}

#[test]
fn test_zero_exit_distributes_nothing() {
    let snap = founders_plus_investor(preferred("series_a", 0, Participation::Participating));
    let result = distribute(&snap, &scenario("0")).unwrap();

    assert_eq!(result.net_proceeds, Decimal::zero());
    assert_eq!(result.total_distributed, Decimal::zero());
    assert!(result
        .by_holder
        .iter()
        .all(|row| row.total_distribution.is_zero() && row.distribution_pct.is_zero()));
    assert!(result.steps.is_empty());
}

#[test]
fn test_senior_tier_is_paid_before_junior() {
    let mut series_b = preferred("series_b", 0, Participation::NonParticipating);
    series_b.liquidation_preference = Some(LiquidationPreference::new(d("2"), 0));
    let snap = snapshot(
        vec![
            preferred("series_a", 1, Participation::NonParticipating),
            series_b,
        ],
        &[
            ("founders", "common", "40000000", None),
            ("acme_vc", "series_a", "10000000", Some("10000000")),
            ("beta_capital", "series_b", "10000000", Some("10000000")),
        ],
        "0",
    );
    let result = distribute(&snap, &scenario("25000000")).unwrap();

    assert_eq!(result.holder_total(&holder("beta_capital")), d("20000000"));
    assert_eq!(result.holder_total(&holder("acme_vc")), d("5000000"));
    assert_eq!(result.holder_total(&holder("founders")), Decimal::zero());
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[0].share_class_id, Some(class("series_b")));
    assert_eq!(result.steps[1].share_class_id, Some(class("series_a")));
    assert_eq!(result.steps[1].amount_distributed, d("5000000"));
}

#[test]
fn test_exhausted_senior_tier_leaves_junior_empty() {
    let snap = snapshot(
        vec![
            preferred("series_a", 1, Participation::NonParticipating),
            preferred("series_b", 0, Participation::NonParticipating),
        ],
        &[
            ("founders", "common", "1000000", None),
            ("acme_vc", "series_a", "10000000", Some("10000000")),
            ("beta_capital", "series_b", "10000000", Some("30000000")),
        ],
        "0",
    );
    let result = distribute(&snap, &scenario("12000000")).unwrap();

    assert_eq!(result.holder_total(&holder("beta_capital")), d("12000000"));
    assert_eq!(result.holder_total(&holder("acme_vc")), Decimal::zero());
    // Only the senior tier ran.
    assert_eq!(result.steps.len(), 1);
}

#[test]
fn test_pari_passu_tier_shares_shortfall_pro_rata() {
    let mut series_a = preferred("series_a", 0, Participation::NonParticipating);
    series_a.liquidation_preference =
        Some(LiquidationPreference::new(Decimal::one(), 0).in_group("senior"));
    let mut series_b = preferred("series_b", 0, Participation::NonParticipating);
    series_b.liquidation_preference =
        Some(LiquidationPreference::new(Decimal::one(), 0).in_group("senior"));
    let snap = snapshot(
        vec![series_a, series_b],
        &[
            ("founders", "common", "1000000", None),
            ("acme_vc", "series_a", "1000000", Some("10000000")),
            ("beta_capital", "series_b", "1000000", Some("20000000")),
        ],
        "0",
    );
    let result = distribute(&snap, &scenario("15000000")).unwrap();

    assert_eq!(result.holder_total(&holder("acme_vc")), d("5000000"));
    assert_eq!(result.holder_total(&holder("beta_capital")), d("10000000"));
    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.steps[0].amount_distributed, d("15000000"));
}

#[test]
fn test_conservation_with_indivisible_amounts() {
    let snap = snapshot(
        vec![],
        &[
            ("founder_alice", "common", "1", None),
            ("founder_bob", "common", "1", None),
            ("founder_carl", "common", "1", None),
        ],
        "0",
    );
    let result = distribute(&snap, &scenario("100")).unwrap();
    let total: Decimal = result.by_holder.iter().map(|r| r.total_distribution).sum();
    assert_eq!(total, d("100"));
    assert_eq!(result.total_distributed, d("100"));
}

#[test]
fn test_conservation_in_mixed_structure() {
    let snap = snapshot(
        vec![
            preferred("series_a", 1, Participation::NonParticipating),
            preferred(
                "series_b",
                0,
                Participation::CappedParticipating {
                    cap_multiple: d("2"),
                },
            ),
        ],
        &[
            ("founders", "common", "40000000", None),
            ("acme_vc", "series_a", "10000000", Some("10000000")),
            ("beta_capital", "series_b", "10000000", Some("20000000")),
        ],
        "10000000",
    );

    for exit in ["0", "1", "7000000", "25000000", "140000000", "987654321.123"] {
        let result = distribute(&snap, &scenario(exit)).unwrap();
        let total: Decimal = result.by_holder.iter().map(|r| r.total_distribution).sum();
        assert_eq!(total, d(exit), "exit {}", exit);
        assert_eq!(result.unallocated, Decimal::zero());

        let class_total: Decimal = result.by_class.iter().map(|c| c.total_distribution).sum();
        assert_eq!(class_total, d(exit));
    }
}

#[test]
fn test_net_proceeds_after_costs_and_carveout() {
    let snap = snapshot(vec![], &[("founders", "common", "1000", None)], "0");
    let mut exit = scenario("100000000");
    exit.transaction_costs_percentage = pct("0.03");
    exit.management_carveout_percentage = pct("0.10");

    let result = distribute(&snap, &exit).unwrap();
    assert_eq!(result.net_proceeds, d("87300000"));
    assert_eq!(result.total_distributed, d("87300000"));
}

#[test]
fn test_residual_goes_to_uncapped_participating_without_common() {
    let snap = snapshot(
        vec![preferred("series_a", 0, Participation::Participating)],
        &[("acme_vc", "series_a", "10000000", Some("10000000"))],
        "10000000",
    );
    let result = distribute(&snap, &scenario("50000000")).unwrap();

    let acme = &result.by_holder[0];
    assert_eq!(acme.liquidation_preference_amount, d("10000000"));
    assert_eq!(acme.participation_amount, d("40000000"));
    assert_eq!(acme.total_distribution, d("50000000"));
    assert_eq!(
        result.steps.last().unwrap().step_name,
        "Residual to Participating Preferred"
    );
}

#[test]
fn test_unclaimable_residual_is_reported() {
    let snap = snapshot(
        vec![preferred(
            "series_a",
            0,
            Participation::CappedParticipating {
                cap_multiple: d("2"),
            },
        )],
        &[("acme_vc", "series_a", "10000000", Some("10000000"))],
        "0",
    );
    let result = distribute(&snap, &scenario("100000000")).unwrap();

    assert_eq!(result.holder_total(&holder("acme_vc")), d("20000000"));
    assert_eq!(result.unallocated, d("80000000"));
    assert_eq!(result.total_distributed + result.unallocated, d("100000000"));
}

#[test]
fn test_ipo_requires_float() {
    let snap = snapshot(vec![], &[("founders", "common", "1000", None)], "0");
    let mut exit = scenario("100000000");
    exit.exit_type = ExitType::Ipo;
    assert!(matches!(
        distribute(&snap, &exit),
        Err(WaterfallError::InvalidScenario(_))
    ));

    exit.float_percentage = pct("0.2");
    assert!(distribute(&snap, &exit).is_ok());
}

#[test]
fn test_unknown_share_class_is_an_error() {
    let snap = snapshot(
        vec![],
        &[
            ("founders", "common", "1000", None),
            ("ghost", "series_z", "1000", None),
        ],
        "0",
    );
    assert!(matches!(
        distribute(&snap, &scenario("1000")),
        Err(WaterfallError::UnknownShareClass { .. })
    ));
}

#[test]
fn test_unexercised_options_take_no_proceeds() {
    let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let mut registry = ShareClassRegistry::new();
    registry
        .insert(ShareClass::common(ShareClassId::common(), "Common"))
        .unwrap();
    let mut builder = SnapshotBuilder::new(date, registry);
    builder.add_or_merge(Position::shares(
        holder("founders"),
        ShareClassId::common(),
        d("1000"),
        date,
        None,
    ));
    let mut warrant = Position::shares(
        holder("bank_dave"),
        class("warrant_common"),
        d("500"),
        date,
        None,
    );
    warrant.is_option = true;
    builder.add_or_merge(warrant);

    let result = distribute(&builder.freeze(), &scenario("1000")).unwrap();
    assert_eq!(result.by_holder.len(), 2);
    assert_eq!(result.holder_total(&holder("founders")), d("1000"));

    // Listed with zero amounts, but kept out of the class rollup.
    let dave = &result.by_holder[1];
    assert_eq!(dave.holder_id.as_str(), "bank_dave");
    assert_eq!(dave.shares, d("500"));
    assert_eq!(dave.total_distribution, Decimal::zero());
    assert_eq!(dave.preference_choice, None);
    assert_eq!(result.by_class.len(), 1);
    assert_eq!(result.total_distributed, d("1000"));
}

#[test]
fn test_rounded_participation_never_exceeds_proceeds() {
    let snap = snapshot(
        vec![preferred("series_a", 0, Participation::Participating)],
        &[
            ("fund_a", "series_a", "1", Some("1")),
            ("fund_b", "series_a", "1", Some("1")),
            ("fund_c", "series_a", "1", Some("1")),
        ],
        "0",
    );
    let result = distribute(&snap, &scenario("5")).unwrap();

    assert_eq!(result.total_distributed, d("5"));
    assert_eq!(result.unallocated, Decimal::zero());
    assert!(result
        .steps
        .iter()
        .all(|step| !step.amount_remaining.is_negative()));
    let participation: Decimal = result.by_holder.iter().map(|r| r.participation_amount).sum();
    assert_eq!(participation, d("2"));
    assert_eq!(
        result.holder_total(&holder("fund_c")),
        d("1.6666666666")
    );
}

#[test]
fn test_large_exit_value_does_not_overflow() {
    let huge = "100000000000000000000000";
    let snap = snapshot(
        vec![],
        &[
            ("founder_alice", "common", "80000000", None),
            ("founder_bob", "common", "20000000", None),
        ],
        "0",
    );
    let result = distribute(&snap, &scenario(huge)).unwrap();
    assert_eq!(result.total_distributed, d(huge));
    assert_eq!(
        result.holder_total(&holder("founder_alice")),
        d("80000000000000000000000")
    );

    let snap = snapshot(
        vec![preferred("series_a", 0, Participation::Participating)],
        &[
            ("founders", "common", "80000000", None),
            ("acme_vc", "series_a", "20000000", Some("20000000")),
        ],
        "0",
    );
    let result = distribute(&snap, &scenario(huge)).unwrap();
    assert_eq!(result.total_distributed, d(huge));
    // 20M preference plus 20% of what is left.
    assert_eq!(
        result.holder_total(&holder("acme_vc")),
        d("20000000000000016000000")
    );
}
