//! Event replay: fold a dated event history into a snapshot.

use crate::domain::{EventId, Position, ShareClassRegistry, ValidationError};
use crate::engine::snapshot::{CapTableSnapshot, SnapshotBuilder, SnapshotError};
use crate::events::{
    CapTableEvent, Conversion, EventKind, OptionExercise, OptionPoolCreation, RoundClosing,
    SafeConversion, ShareIssuance, ShareTransfer, WarrantIssuance,
};
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    #[error("event {event_id} is invalid: {source}")]
    InvalidEvent {
        event_id: EventId,
        #[source]
        source: ValidationError,
    },
    #[error("event {event_id} ({event_type}) could not be applied: {source}")]
    Apply {
        event_id: EventId,
        event_type: &'static str,
        #[source]
        source: SnapshotError,
    },
}

/// Replay every event dated on or before `as_of_date`.
///
/// Events are applied in date order; same-date events keep the order they
/// were given in. The first failure aborts the whole replay.
pub fn replay<'a, I>(
    events: I,
    share_classes: &ShareClassRegistry,
    as_of_date: NaiveDate,
) -> Result<CapTableSnapshot, ReplayError>
where
    I: IntoIterator<Item = &'a CapTableEvent>,
{
    let mut ordered: Vec<&CapTableEvent> = events
        .into_iter()
        .filter(|event| event.event_date <= as_of_date)
        .collect();
    ordered.sort_by_key(|event| event.event_date);

    let mut builder = SnapshotBuilder::new(as_of_date, share_classes.clone());
    for event in &ordered {
        event
            .validate()
            .map_err(|source| ReplayError::InvalidEvent {
                event_id: event.event_id.clone(),
                source,
            })?;
        apply_event(&mut builder, event).map_err(|source| ReplayError::Apply {
            event_id: event.event_id.clone(),
            event_type: event.event_type(),
            source,
        })?;
        tracing::debug!(
            event_id = %event.event_id,
            event_type = event.event_type(),
            event_date = %event.event_date,
            shares_outstanding = %builder.total_shares_outstanding(),
            "Applied event"
        );
    }

    let snapshot = builder.freeze();
    tracing::info!(
        as_of = %as_of_date,
        events = ordered.len(),
        positions = snapshot.positions().len(),
        shares_outstanding = %snapshot.total_shares_outstanding(),
        fully_diluted = %snapshot.fully_diluted_shares(),
        "Replay complete"
    );
    Ok(snapshot)
}

/// Apply one event to the snapshot under construction.
pub fn apply_event(
    builder: &mut SnapshotBuilder,
    event: &CapTableEvent,
) -> Result<(), SnapshotError> {
    let date = event.event_date;
    match &event.kind {
        EventKind::ShareIssuance(issue) => {
            apply_issuance(builder, issue, date);
            Ok(())
        }
        EventKind::ShareTransfer(transfer) => apply_transfer(builder, transfer, date),
        EventKind::Conversion(conversion) => apply_conversion(builder, conversion, date),
        EventKind::OptionExercise(exercise) => apply_exercise(builder, exercise, date),
        EventKind::RoundClosing(round) => {
            apply_round(builder, round, date);
            Ok(())
        }
        EventKind::SafeConversion(conversion) => {
            apply_safe_conversion(builder, conversion, date);
            Ok(())
        }
        EventKind::OptionPoolCreation(pool) => {
            apply_pool(builder, pool);
            Ok(())
        }
        EventKind::WarrantIssuance(issue) => {
            apply_warrant(builder, issue, date);
            Ok(())
        }
    }
}

fn apply_issuance(builder: &mut SnapshotBuilder, issue: &ShareIssuance, date: NaiveDate) {
    let mut position = Position::shares(
        issue.holder_id.clone(),
        issue.share_class_id.clone(),
        issue.shares,
        date,
        issue.price_per_share.map(|price| price * issue.shares),
    );
    position.vesting_schedule_id = issue.vesting_schedule_id.clone();
    builder.add_or_merge(position);
}

/// Seller gives up shares in their class; the buyer receives the resulting
/// class at the transfer price.
fn apply_transfer(
    builder: &mut SnapshotBuilder,
    transfer: &ShareTransfer,
    date: NaiveDate,
) -> Result<(), SnapshotError> {
    builder.reduce(
        &transfer.from_holder_id,
        &transfer.share_class_id,
        transfer.shares,
    )?;
    builder.add_or_merge(Position::shares(
        transfer.to_holder_id.clone(),
        transfer.buyer_class().clone(),
        transfer.shares,
        date,
        transfer.price_per_share.map(|price| price * transfer.shares),
    ));
    Ok(())
}

/// Cost basis carries over from the converted shares.
fn apply_conversion(
    builder: &mut SnapshotBuilder,
    conversion: &Conversion,
    date: NaiveDate,
) -> Result<(), SnapshotError> {
    let carried_cost = builder.reduce(
        &conversion.holder_id,
        &conversion.from_share_class_id,
        conversion.shares_converted,
    )?;
    builder.add_or_merge(Position::shares(
        conversion.holder_id.clone(),
        conversion.to_share_class_id.clone(),
        conversion.resulting_shares(),
        date,
        carried_cost,
    ));
    Ok(())
}

fn apply_exercise(
    builder: &mut SnapshotBuilder,
    exercise: &OptionExercise,
    date: NaiveDate,
) -> Result<(), SnapshotError> {
    builder.draw_option_pool(exercise.shares_exercised)?;
    builder.add_or_merge(Position::shares(
        exercise.holder_id.clone(),
        exercise.resulting_share_class_id.clone(),
        exercise.shares_exercised,
        date,
        Some(exercise.exercise_price * exercise.shares_exercised),
    ));
    Ok(())
}

fn apply_round(builder: &mut SnapshotBuilder, round: &RoundClosing, date: NaiveDate) {
    // SAFEs convert before new money lands; the pool follows the new shares.
    for conversion in &round.safe_conversions {
        apply_safe_conversion(builder, conversion, date);
    }
    for issue in &round.share_issuances {
        apply_issuance(builder, issue, date);
    }
    if let Some(pool) = &round.option_pool_created {
        apply_pool(builder, pool);
    }
    for warrant in &round.warrants_issued {
        apply_warrant(builder, warrant, date);
    }
    tracing::debug!(
        round_id = %round.round_id,
        amount_raised = %round.amount_raised(),
        safes = round.safe_conversions.len(),
        issuances = round.share_issuances.len(),
        "Closed round"
    );
}

fn apply_safe_conversion(
    builder: &mut SnapshotBuilder,
    conversion: &SafeConversion,
    date: NaiveDate,
) {
    builder.add_or_merge(Position::shares(
        conversion.safe_holder_id.clone(),
        conversion.resulting_share_class_id.clone(),
        conversion.shares_issued,
        date,
        Some(conversion.safe_instrument.investment_amount),
    ));
}

fn apply_pool(builder: &mut SnapshotBuilder, pool: &OptionPoolCreation) {
    builder.expand_option_pool(pool.shares_authorized);
}

fn apply_warrant(builder: &mut SnapshotBuilder, issue: &WarrantIssuance, date: NaiveDate) {
    let warrant = &issue.warrant;
    builder.add_or_merge(Position {
        holder_id: issue.holder_id.clone(),
        share_class_id: warrant.share_class_id.warrant_on(),
        shares: warrant.shares_purchasable,
        acquisition_date: date,
        cost_basis: None,
        vesting_schedule_id: None,
        is_option: true,
        exercise_price: Some(warrant.exercise_price),
        expiration_date: warrant.expiration_date,
    });
}
