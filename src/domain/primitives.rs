//! Domain primitives: identifiers, percentages and currency codes.

use crate::domain::{Decimal, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

fn is_snake_case(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

macro_rules! snake_case_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create an identifier, rejecting anything that is not snake_case.
            pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
                let value = value.into();
                if !is_snake_case(&value) {
                    return Err(ValidationError::InvalidIdentifier {
                        kind: $kind,
                        value,
                    });
                }
                Ok($name(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                $name::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::new(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snake_case_id!(
    /// Shareholder identifier (e.g. "founder_alice", "acme_vc").
    HolderId,
    "holder"
);

snake_case_id!(
    /// Share class identifier (e.g. "common", "series_a_preferred").
    ShareClassId,
    "share class"
);

snake_case_id!(
    /// Funding round identifier (e.g. "seed", "series_a").
    RoundId,
    "round"
);

impl ShareClassId {
    /// The conventional common stock class.
    pub fn common() -> Self {
        ShareClassId("common".to_string())
    }

    /// Class id under which warrants on `self` are tracked.
    pub fn warrant_on(&self) -> Self {
        ShareClassId(format!("warrant_{}", self.0))
    }
}

/// Event identifier: a UUID or any caller-chosen label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(value: impl Into<String>) -> Self {
        EventId(value.into())
    }

    /// Mint a fresh random (v4) event id.
    pub fn generate() -> Self {
        EventId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fraction in [0, 1] (0.2 = 20%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percentage(Decimal);

impl Percentage {
    pub fn new(value: Decimal) -> Result<Self, ValidationError> {
        if value.is_negative() || value > Decimal::one() {
            return Err(ValidationError::PercentageOutOfRange {
                field: "percentage".to_string(),
                value,
            });
        }
        Ok(Percentage(value))
    }

    pub fn zero() -> Self {
        Percentage(Decimal::zero())
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Percentage {
    type Error = ValidationError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Percentage::new(value)
    }
}

impl From<Percentage> for Decimal {
    fn from(value: Percentage) -> Self {
        value.0
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO 4217 currency code (3 uppercase letters).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.len() != 3 || !value.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ValidationError::InvalidCurrency(value));
        }
        Ok(CurrencyCode(value))
    }

    pub fn usd() -> Self {
        CurrencyCode("USD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CurrencyCode {
    fn default() -> Self {
        CurrencyCode::usd()
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CurrencyCode::new(value)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holder_id_accepts_snake_case() {
        let id = HolderId::new("founder_alice").unwrap();
        assert_eq!(id.as_str(), "founder_alice");
        assert!(HolderId::new("employee_1234").is_ok());
    }

    #[test]
    fn test_identifier_rejects_bad_shapes() {
        for bad in ["", "Founder", "1st_holder", "acme-vc", "acme vc"] {
            assert!(
                matches!(
                    ShareClassId::new(bad),
                    Err(ValidationError::InvalidIdentifier { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_identifier_deserialization_validates() {
        let ok: RoundId = serde_json::from_str("\"series_a\"").unwrap();
        assert_eq!(ok.to_string(), "series_a");
        assert!(serde_json::from_str::<RoundId>("\"Series A\"").is_err());
    }

    #[test]
    fn test_percentage_bounds() {
        assert!(Percentage::new(Decimal::zero()).is_ok());
        assert!(Percentage::new(Decimal::one()).is_ok());
        assert!(Percentage::new(Decimal::from(2i64)).is_err());
        assert!(Percentage::new(Decimal::from(-1i64)).is_err());
        assert!(serde_json::from_str::<Percentage>("\"1.5\"").is_err());
    }

    #[test]
    fn test_currency_code() {
        assert!(CurrencyCode::new("GBP").is_ok());
        assert!(CurrencyCode::new("usd").is_err());
        assert!(CurrencyCode::new("EURO").is_err());
    }

    #[test]
    fn test_event_id_generate_is_unique() {
        assert_ne!(EventId::generate(), EventId::generate());
    }
}
