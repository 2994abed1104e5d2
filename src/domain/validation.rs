//! Construction-time validation errors for cap table domain data.

use crate::domain::Decimal;
use thiserror::Error;

/// Invalid caller-supplied domain data. Never recoverable by retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be non-negative, got {value}")]
    Negative { field: String, value: Decimal },
    #[error("{field} must be greater than zero, got {value}")]
    NotPositive { field: String, value: Decimal },
    #[error("{field} must be between 0 and 1, got {value}")]
    PercentageOutOfRange { field: String, value: Decimal },
    #[error("invalid {kind} identifier '{value}': expected snake_case starting with a letter")]
    InvalidIdentifier { kind: &'static str, value: String },
    #[error("share class {class_id}: preferred stock must have a liquidation preference")]
    PreferredWithoutPreference { class_id: String },
    #[error("share class {class_id}: {share_type} cannot have a liquidation preference")]
    DerivativeWithPreference { class_id: String, share_type: String },
    #[error("cap_multiple must be > 1.0 (cap must exceed the liquidation preference), got {cap}")]
    CapMultipleTooLow { cap: Decimal },
    #[error("SAFE must have at least one of valuation_cap or discount_rate")]
    SafeTermsMissing,
    #[error("convertible note must have at least one of valuation_cap or discount_rate")]
    NoteTermsMissing,
    #[error(
        "inconsistent priced round: price_per_share * shares_issued = {computed}, \
         investment_amount = {stated}, difference exceeds tolerance {tolerance}"
    )]
    PricedRoundMismatch {
        computed: Decimal,
        stated: Decimal,
        tolerance: Decimal,
    },
    #[error("{field} must be after {start}")]
    InvalidDateRange { field: String, start: chrono::NaiveDate },
    #[error("exit scenario {scenario_id}: IPO exit requires float_percentage")]
    IpoWithoutFloat { scenario_id: String },
    #[error("target_post_money option pool requires target_percentage")]
    TargetPercentageRequired,
    #[error("pari passu group {group} spans multiple seniority ranks: {ranks:?}")]
    PariPassuRankMismatch { group: String, ranks: Vec<u32> },
    #[error("currency must be a 3-letter uppercase ISO 4217 code, got: {0}")]
    InvalidCurrency(String),
    #[error("exchange rate not defined for {0}")]
    MissingExchangeRate(String),
    #[error("duplicate share class id: {0}")]
    DuplicateShareClass(String),
    #[error("share class stored under key {key} has id {id}")]
    ShareClassKeyMismatch { key: String, id: String },
    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),
}

/// Reject negative share counts, money amounts and multiples.
pub fn ensure_non_negative(field: &str, value: Decimal) -> Result<(), ValidationError> {
    if value.is_negative() {
        return Err(ValidationError::Negative {
            field: field.to_string(),
            value,
        });
    }
    Ok(())
}

/// Reject zero or negative prices.
pub fn ensure_positive(field: &str, value: Decimal) -> Result<(), ValidationError> {
    if !value.is_positive() {
        return Err(ValidationError::NotPositive {
            field: field.to_string(),
            value,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_non_negative() {
        assert!(ensure_non_negative("shares", Decimal::zero()).is_ok());
        let err = ensure_non_negative("shares", Decimal::from(-1i64)).unwrap_err();
        assert_eq!(err.to_string(), "shares must be non-negative, got -1");
    }

    #[test]
    fn test_ensure_positive_rejects_zero() {
        assert!(matches!(
            ensure_positive("price_per_share", Decimal::zero()),
            Err(ValidationError::NotPositive { .. })
        ));
    }
}
