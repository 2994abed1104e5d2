//! A holder's stake in a share class at a point in time.

use crate::domain::{Decimal, HolderId, ShareClassId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identity of a position within a snapshot.
///
/// Adding a position whose key already exists accumulates into it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PositionKey {
    pub holder_id: HolderId,
    pub share_class_id: ShareClassId,
    pub is_option: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub holder_id: HolderId,
    pub share_class_id: ShareClassId,
    pub shares: Decimal,
    pub acquisition_date: NaiveDate,
    /// Total paid for the shares. None for zero-cost grants (founder shares).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_basis: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vesting_schedule_id: Option<String>,
    /// Unexercised option or warrant.
    #[serde(default)]
    pub is_option: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<NaiveDate>,
}

impl Position {
    /// A plain share position.
    pub fn shares(
        holder_id: HolderId,
        share_class_id: ShareClassId,
        shares: Decimal,
        acquisition_date: NaiveDate,
        cost_basis: Option<Decimal>,
    ) -> Self {
        Self {
            holder_id,
            share_class_id,
            shares,
            acquisition_date,
            cost_basis,
            vesting_schedule_id: None,
            is_option: false,
            exercise_price: None,
            expiration_date: None,
        }
    }

    pub fn key(&self) -> PositionKey {
        PositionKey {
            holder_id: self.holder_id.clone(),
            share_class_id: self.share_class_id.clone(),
            is_option: self.is_option,
        }
    }

    pub fn matches(&self, key: &PositionKey) -> bool {
        self.holder_id == key.holder_id
            && self.share_class_id == key.share_class_id
            && self.is_option == key.is_option
    }

    /// Cost per share, if the position has a cost basis and any shares.
    pub fn effective_cost_per_share(&self) -> Option<Decimal> {
        match self.cost_basis {
            Some(cost) if !self.shares.is_zero() => Some(cost / self.shares),
            _ => None,
        }
    }

    /// What it would cost to exercise every share under option.
    pub fn total_exercise_cost(&self) -> Option<Decimal> {
        if !self.is_option {
            return None;
        }
        self.exercise_price.map(|price| price * self.shares)
    }

    /// True once an option or warrant has passed its expiration date.
    pub fn is_expired(&self, as_of: NaiveDate) -> bool {
        self.expiration_date.is_some_and(|expiry| as_of > expiry)
    }
}
