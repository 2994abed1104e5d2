//! The cap table aggregate root: share classes plus the event history.
//!
//! Snapshots are always derived by replay and never stored.

use crate::domain::{CurrencyCode, Decimal, ShareClass, ShareClassRegistry, ValidationError};
use crate::engine::replay::{replay, ReplayError};
use crate::engine::snapshot::CapTableSnapshot;
use crate::events::{CapTableEvent, EventLog};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CapTableError {
    #[error("invalid cap table: {0}")]
    Validation(#[from] ValidationError),
    #[error("malformed cap table document: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Replay(#[from] ReplayError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapTable {
    pub company_name: String,
    #[serde(default)]
    pub base_currency: CurrencyCode,
    #[serde(default)]
    pub events: EventLog,
    #[serde(default)]
    pub share_classes: ShareClassRegistry,
    /// Units of base currency per unit of the keyed currency.
    #[serde(default)]
    pub exchange_rates: BTreeMap<CurrencyCode, Decimal>,
}

impl CapTable {
    pub fn new(company_name: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            base_currency: CurrencyCode::usd(),
            events: EventLog::new(),
            share_classes: ShareClassRegistry::new(),
            exchange_rates: BTreeMap::new(),
        }
    }

    /// Parse and validate a JSON cap table document.
    pub fn from_json(document: &str) -> Result<Self, CapTableError> {
        let cap_table: CapTable = serde_json::from_str(document)?;
        cap_table.validate()?;
        Ok(cap_table)
    }

    pub fn add_share_class(&mut self, class: ShareClass) -> Result<(), ValidationError> {
        self.share_classes.insert(class)
    }

    /// Validate and insert in date order.
    pub fn add_event(&mut self, event: CapTableEvent) -> Result<(), ValidationError> {
        event.validate()?;
        self.events.insert(event);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.share_classes.validate()?;
        for event in self.events.iter() {
            event.validate()?;
        }
        for rate in self.exchange_rates.values() {
            crate::domain::ensure_positive("exchange_rate", *rate)?;
        }
        Ok(())
    }

    pub fn snapshot(&self, as_of_date: NaiveDate) -> Result<CapTableSnapshot, ReplayError> {
        replay(
            self.events.up_to(as_of_date),
            &self.share_classes,
            as_of_date,
        )
    }

    /// Snapshot as of today.
    pub fn current_snapshot(&self) -> Result<CapTableSnapshot, ReplayError> {
        self.snapshot(chrono::Utc::now().date_naive())
    }

    pub fn convert_to_base_currency(
        &self,
        amount: Decimal,
        currency: &CurrencyCode,
    ) -> Result<Decimal, ValidationError> {
        if currency == &self.base_currency {
            return Ok(amount);
        }
        self.exchange_rates
            .get(currency)
            .map(|rate| amount * *rate)
            .ok_or_else(|| ValidationError::MissingExchangeRate(currency.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HolderId, ShareClassId};
    use crate::events::ShareIssuance;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_currency_conversion() {
        let mut cap_table = CapTable::new("Acme Inc");
        let gbp = CurrencyCode::new("GBP").unwrap();
        cap_table.exchange_rates.insert(gbp.clone(), d("1.27"));

        assert_eq!(
            cap_table.convert_to_base_currency(d("1000"), &gbp).unwrap(),
            d("1270")
        );
        assert_eq!(
            cap_table
                .convert_to_base_currency(d("5"), &CurrencyCode::usd())
                .unwrap(),
            d("5")
        );
        assert!(matches!(
            cap_table.convert_to_base_currency(d("5"), &CurrencyCode::new("EUR").unwrap()),
            Err(ValidationError::MissingExchangeRate(_))
        ));
    }

    #[test]
    fn test_add_event_rejects_invalid() {
        let mut cap_table = CapTable::new("Acme Inc");
        let bad = CapTableEvent::new(
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            ShareIssuance::new(
                HolderId::new("founder_alice").unwrap(),
                ShareClassId::common(),
                d("-1"),
            ),
        );
        assert!(cap_table.add_event(bad).is_err());
        assert!(cap_table.events.is_empty());
    }

    #[test]
    fn test_from_json_validates() {
        let doc = r#"{
            "company_name": "Acme Inc",
            "share_classes": {
                "series_a": {
                    "id": "series_a",
                    "name": "Series A",
                    "share_type": "preferred"
                }
            }
        }"#;
        assert!(matches!(
            CapTable::from_json(doc),
            Err(CapTableError::Validation(
                ValidationError::PreferredWithoutPreference { .. }
            ))
        ));
        assert!(matches!(
            CapTable::from_json("{"),
            Err(CapTableError::Json(_))
        ));
    }
}
