//! Immutable, dated cap table events.
//!
//! Every change to ownership is recorded as a [`CapTableEvent`]. The payload
//! is a closed union so the replay reducer can match exhaustively.

pub mod log;

pub use log::EventLog;

use crate::domain::{
    ensure_non_negative, Decimal, EventId, HolderId, Instrument, Percentage, RoundId,
    SafeInstrument, ShareClassId, ValidationError, WarrantInstrument,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A dated entry in the cap table history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapTableEvent {
    #[serde(default = "EventId::generate")]
    pub event_id: EventId,
    pub event_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl CapTableEvent {
    /// Wrap a payload with a freshly generated id.
    pub fn new(event_date: NaiveDate, kind: impl Into<EventKind>) -> Self {
        Self {
            event_id: EventId::generate(),
            event_date,
            description: None,
            kind: kind.into(),
        }
    }

    pub fn with_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = EventId::new(event_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.kind.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventKind {
    ShareIssuance(ShareIssuance),
    ShareTransfer(ShareTransfer),
    Conversion(Conversion),
    OptionExercise(OptionExercise),
    RoundClosing(RoundClosing),
    SafeConversion(SafeConversion),
    OptionPoolCreation(OptionPoolCreation),
    WarrantIssuance(WarrantIssuance),
}

impl EventKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            EventKind::ShareIssuance(_) => "share_issuance",
            EventKind::ShareTransfer(_) => "share_transfer",
            EventKind::Conversion(_) => "conversion",
            EventKind::OptionExercise(_) => "option_exercise",
            EventKind::RoundClosing(_) => "round_closing",
            EventKind::SafeConversion(_) => "safe_conversion",
            EventKind::OptionPoolCreation(_) => "option_pool_creation",
            EventKind::WarrantIssuance(_) => "warrant_issuance",
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            EventKind::ShareIssuance(e) => e.validate(),
            EventKind::ShareTransfer(e) => e.validate(),
            EventKind::Conversion(e) => e.validate(),
            EventKind::OptionExercise(e) => e.validate(),
            EventKind::RoundClosing(e) => e.validate(),
            EventKind::SafeConversion(e) => e.validate(),
            EventKind::OptionPoolCreation(e) => e.validate(),
            EventKind::WarrantIssuance(e) => e.validate(),
        }
    }
}

macro_rules! into_event_kind {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for EventKind {
                fn from(payload: $variant) -> Self {
                    EventKind::$variant(payload)
                }
            }
        )*
    };
}

into_event_kind!(
    ShareIssuance,
    ShareTransfer,
    Conversion,
    OptionExercise,
    RoundClosing,
    SafeConversion,
    OptionPoolCreation,
    WarrantIssuance,
);

/// New shares issued to a holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareIssuance {
    pub holder_id: HolderId,
    pub share_class_id: ShareClassId,
    pub shares: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_share: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vesting_schedule_id: Option<String>,
}

impl ShareIssuance {
    pub fn new(holder_id: HolderId, share_class_id: ShareClassId, shares: Decimal) -> Self {
        Self {
            holder_id,
            share_class_id,
            shares,
            price_per_share: None,
            vesting_schedule_id: None,
        }
    }

    pub fn priced(mut self, price_per_share: Decimal) -> Self {
        self.price_per_share = Some(price_per_share);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        ensure_non_negative("shares", self.shares)?;
        if let Some(price) = self.price_per_share {
            ensure_non_negative("price_per_share", price)?;
        }
        Ok(())
    }
}

/// Shares move between holders. The buyer may receive a different class
/// than the seller gave up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareTransfer {
    pub from_holder_id: HolderId,
    pub to_holder_id: HolderId,
    pub share_class_id: ShareClassId,
    pub shares: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_share: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resulting_share_class_id: Option<ShareClassId>,
}

impl ShareTransfer {
    pub fn validate(&self) -> Result<(), ValidationError> {
        ensure_non_negative("shares", self.shares)?;
        if let Some(price) = self.price_per_share {
            ensure_non_negative("price_per_share", price)?;
        }
        Ok(())
    }

    pub fn buyer_class(&self) -> &ShareClassId {
        self.resulting_share_class_id
            .as_ref()
            .unwrap_or(&self.share_class_id)
    }
}

/// A holder converts shares of one class into another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversion {
    pub holder_id: HolderId,
    pub from_share_class_id: ShareClassId,
    pub to_share_class_id: ShareClassId,
    pub shares_converted: Decimal,
    pub conversion_ratio: Decimal,
}

impl Conversion {
    pub fn validate(&self) -> Result<(), ValidationError> {
        ensure_non_negative("shares_converted", self.shares_converted)?;
        ensure_non_negative("conversion_ratio", self.conversion_ratio)
    }

    pub fn resulting_shares(&self) -> Decimal {
        self.shares_converted * self.conversion_ratio
    }
}

/// Options drawn from the pool become real shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionExercise {
    pub holder_id: HolderId,
    pub option_grant_id: String,
    pub shares_exercised: Decimal,
    pub exercise_price: Decimal,
    pub resulting_share_class_id: ShareClassId,
}

impl OptionExercise {
    pub fn validate(&self) -> Result<(), ValidationError> {
        ensure_non_negative("shares_exercised", self.shares_exercised)?;
        ensure_non_negative("exercise_price", self.exercise_price)
    }
}

/// A SAFE converts at a precomputed price into a priced round's class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeConversion {
    pub safe_holder_id: HolderId,
    pub safe_instrument: SafeInstrument,
    pub conversion_price: Decimal,
    pub shares_issued: Decimal,
    pub resulting_share_class_id: ShareClassId,
}

impl SafeConversion {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.safe_instrument.validate()?;
        ensure_non_negative("conversion_price", self.conversion_price)?;
        ensure_non_negative("shares_issued", self.shares_issued)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolTiming {
    PreMoney,
    PostMoney,
    TargetPostMoney,
}

fn default_pool_class() -> ShareClassId {
    ShareClassId::common()
}

/// Shares reserved for future option grants.
///
/// `shares_authorized` is always caller-computed, including for
/// `target_post_money` pools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionPoolCreation {
    pub shares_authorized: Decimal,
    pub pool_timing: PoolTiming,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_percentage: Option<Percentage>,
    #[serde(default = "default_pool_class")]
    pub share_class_id: ShareClassId,
}

impl OptionPoolCreation {
    pub fn new(shares_authorized: Decimal, pool_timing: PoolTiming) -> Self {
        Self {
            shares_authorized,
            pool_timing,
            target_percentage: None,
            share_class_id: default_pool_class(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        ensure_non_negative("shares_authorized", self.shares_authorized)?;
        if self.pool_timing == PoolTiming::TargetPostMoney && self.target_percentage.is_none() {
            return Err(ValidationError::TargetPercentageRequired);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarrantIssuance {
    pub holder_id: HolderId,
    pub warrant: WarrantInstrument,
}

impl WarrantIssuance {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.warrant.validate()
    }
}

/// A financing round applied as one unit.
///
/// Sub-events are applied in a fixed order: SAFE conversions, share
/// issuances, the option pool, then warrants. All take the round's date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundClosing {
    pub round_id: RoundId,
    pub round_name: String,
    #[serde(default)]
    pub instruments: Vec<Instrument>,
    #[serde(default)]
    pub safe_conversions: Vec<SafeConversion>,
    #[serde(default)]
    pub share_issuances: Vec<ShareIssuance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_pool_created: Option<OptionPoolCreation>,
    #[serde(default)]
    pub warrants_issued: Vec<WarrantIssuance>,
}

impl RoundClosing {
    pub fn new(round_id: RoundId, round_name: impl Into<String>) -> Self {
        Self {
            round_id,
            round_name: round_name.into(),
            instruments: Vec::new(),
            safe_conversions: Vec::new(),
            share_issuances: Vec::new(),
            option_pool_created: None,
            warrants_issued: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.instruments.iter().try_for_each(Instrument::validate)?;
        self.safe_conversions
            .iter()
            .try_for_each(SafeConversion::validate)?;
        self.share_issuances
            .iter()
            .try_for_each(ShareIssuance::validate)?;
        if let Some(pool) = &self.option_pool_created {
            pool.validate()?;
        }
        self.warrants_issued
            .iter()
            .try_for_each(WarrantIssuance::validate)
    }

    /// New money raised by the round's share issuances.
    pub fn amount_raised(&self) -> Decimal {
        self.share_issuances
            .iter()
            .filter_map(|issue| issue.price_per_share.map(|price| price * issue.shares))
            .sum()
    }
}
