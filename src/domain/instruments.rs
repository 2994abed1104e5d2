//! Investment instruments: SAFEs, priced rounds, convertible notes, warrants.

use crate::domain::{
    ensure_non_negative, ensure_positive, Decimal, Percentage, ShareClassId, ValidationError,
};
use chrono::NaiveDate;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

const DAYS_PER_YEAR: Decimal = Decimal::new(dec!(365.25));
const PRICED_ROUND_TOLERANCE: Decimal = Decimal::new(dec!(0.01));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafeType {
    PreMoney,
    #[default]
    PostMoney,
}

/// Which term produced the conversion price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionBasis {
    ValuationCap,
    Discount,
    RoundPrice,
}

/// Result of pricing a SAFE or note conversion into a priced round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionQuote {
    pub conversion_price: Decimal,
    pub shares_issued: Decimal,
    pub basis: ConversionBasis,
}

/// Price a conversion using whichever of cap and discount yields the lower
/// price (more shares for the investor). Never worse than the round price.
///
/// `capitalization` is the share count the cap is measured against: the
/// pre-round fully diluted count for pre-money instruments, the post-money
/// capitalization for post-money SAFEs.
fn quote_conversion(
    amount: Decimal,
    valuation_cap: Option<Decimal>,
    discount_rate: Option<Percentage>,
    round_price: Decimal,
    capitalization: Decimal,
) -> Result<ConversionQuote, ValidationError> {
    ensure_positive("round_price", round_price)?;
    ensure_non_negative("conversion amount", amount)?;

    let mut best = (round_price, ConversionBasis::RoundPrice);

    if let Some(cap) = valuation_cap {
        if capitalization.is_positive() {
            let cap_price = cap / capitalization;
            if cap_price < best.0 {
                best = (cap_price, ConversionBasis::ValuationCap);
            }
        }
    }

    if let Some(discount) = discount_rate {
        let discount_price = round_price * (Decimal::one() - discount.value());
        if discount_price < best.0 {
            best = (discount_price, ConversionBasis::Discount);
        }
    }

    let (conversion_price, basis) = best;
    ensure_positive("conversion_price", conversion_price)?;

    Ok(ConversionQuote {
        conversion_price,
        shares_issued: amount / conversion_price,
        basis,
    })
}

/// Simple Agreement for Future Equity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeInstrument {
    pub investment_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valuation_cap: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_rate: Option<Percentage>,
    #[serde(default)]
    pub safe_type: SafeType,
}

impl SafeInstrument {
    pub fn validate(&self) -> Result<(), ValidationError> {
        ensure_non_negative("investment_amount", self.investment_amount)?;
        if let Some(cap) = self.valuation_cap {
            ensure_non_negative("valuation_cap", cap)?;
        }
        if self.valuation_cap.is_none() && self.discount_rate.is_none() {
            return Err(ValidationError::SafeTermsMissing);
        }
        Ok(())
    }

    pub fn quote_conversion(
        &self,
        round_price: Decimal,
        capitalization: Decimal,
    ) -> Result<ConversionQuote, ValidationError> {
        quote_conversion(
            self.investment_amount,
            self.valuation_cap,
            self.discount_rate,
            round_price,
            capitalization,
        )
    }
}

/// Priced equity round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedRoundInstrument {
    pub investment_amount: Decimal,
    pub pre_money_valuation: Decimal,
    pub price_per_share: Decimal,
    pub shares_issued: Decimal,
}

impl PricedRoundInstrument {
    /// Checks `price_per_share * shares_issued` is within 1% of the stated
    /// investment.
    pub fn validate(&self) -> Result<(), ValidationError> {
        ensure_non_negative("investment_amount", self.investment_amount)?;
        ensure_non_negative("pre_money_valuation", self.pre_money_valuation)?;
        ensure_positive("price_per_share", self.price_per_share)?;
        ensure_non_negative("shares_issued", self.shares_issued)?;

        let computed = self.price_per_share * self.shares_issued;
        let tolerance = self.investment_amount * PRICED_ROUND_TOLERANCE;
        if (computed - self.investment_amount).abs() > tolerance {
            return Err(ValidationError::PricedRoundMismatch {
                computed,
                stated: self.investment_amount,
                tolerance,
            });
        }
        Ok(())
    }

    pub fn post_money_valuation(&self) -> Decimal {
        self.pre_money_valuation + self.investment_amount
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestType {
    #[default]
    Simple,
    Compound,
}

/// Debt that converts into equity; interest always accrues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertibleNoteInstrument {
    pub principal_amount: Decimal,
    pub interest_rate: Percentage,
    #[serde(default)]
    pub interest_type: InterestType,
    pub issue_date: NaiveDate,
    pub maturity_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valuation_cap: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_rate: Option<Percentage>,
}

impl ConvertibleNoteInstrument {
    pub fn validate(&self) -> Result<(), ValidationError> {
        ensure_non_negative("principal_amount", self.principal_amount)?;
        if self.maturity_date <= self.issue_date {
            return Err(ValidationError::InvalidDateRange {
                field: "maturity_date".to_string(),
                start: self.issue_date,
            });
        }
        if self.valuation_cap.is_none() && self.discount_rate.is_none() {
            return Err(ValidationError::NoteTermsMissing);
        }
        Ok(())
    }

    /// Principal plus interest accrued up to `as_of`.
    ///
    /// Years are measured as days / 365.25. Compound interest compounds
    /// annually with fractional years allowed.
    pub fn accrued_amount(&self, as_of: NaiveDate) -> Result<Decimal, ValidationError> {
        let days = (as_of - self.issue_date).num_days().max(0);
        let years = Decimal::from(days) / DAYS_PER_YEAR;
        let rate = self.interest_rate.value();

        let interest = match self.interest_type {
            InterestType::Simple => self.principal_amount * rate * years,
            InterestType::Compound => {
                let growth = (Decimal::one() + rate)
                    .inner()
                    .checked_powd(years.inner())
                    .ok_or(ValidationError::Overflow("compound note interest"))?;
                self.principal_amount * (Decimal::new(growth) - Decimal::one())
            }
        };

        Ok(self.principal_amount + interest)
    }

    /// Price conversion of the accrued balance as of `conversion_date`.
    pub fn quote_conversion(
        &self,
        conversion_date: NaiveDate,
        round_price: Decimal,
        capitalization: Decimal,
    ) -> Result<ConversionQuote, ValidationError> {
        let amount = self.accrued_amount(conversion_date)?;
        quote_conversion(
            amount,
            self.valuation_cap,
            self.discount_rate,
            round_price,
            capitalization,
        )
    }
}

/// Right to buy shares at a strike price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarrantInstrument {
    pub shares_purchasable: Decimal,
    pub exercise_price: Decimal,
    pub share_class_id: ShareClassId,
    pub issue_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<NaiveDate>,
}

impl WarrantInstrument {
    pub fn validate(&self) -> Result<(), ValidationError> {
        ensure_non_negative("shares_purchasable", self.shares_purchasable)?;
        ensure_positive("exercise_price", self.exercise_price)?;
        if let Some(expiry) = self.expiration_date {
            if expiry <= self.issue_date {
                return Err(ValidationError::InvalidDateRange {
                    field: "expiration_date".to_string(),
                    start: self.issue_date,
                });
            }
        }
        Ok(())
    }
}

/// Any instrument used in a round, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Instrument {
    #[serde(rename = "SAFE")]
    Safe(SafeInstrument),
    #[serde(rename = "priced")]
    PricedRound(PricedRoundInstrument),
    #[serde(rename = "convertible_note")]
    ConvertibleNote(ConvertibleNoteInstrument),
    #[serde(rename = "warrant")]
    Warrant(WarrantInstrument),
}

impl Instrument {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Instrument::Safe(safe) => safe.validate(),
            Instrument::PricedRound(round) => round.validate(),
            Instrument::ConvertibleNote(note) => note.validate(),
            Instrument::Warrant(warrant) => warrant.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn pct(s: &str) -> Percentage {
        Percentage::new(d(s)).unwrap()
    }

    fn date(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_safe_requires_cap_or_discount() {
        let safe = SafeInstrument {
            investment_amount: d("100000"),
            valuation_cap: None,
            discount_rate: None,
            safe_type: SafeType::PostMoney,
        };
        assert_eq!(safe.validate(), Err(ValidationError::SafeTermsMissing));
    }

    #[test]
    fn test_safe_conversion_takes_better_of_cap_and_discount() {
        // $100K, $5M cap, 20% discount; round at $1.00 with 10M shares.
        let safe = SafeInstrument {
            investment_amount: d("100000"),
            valuation_cap: Some(d("5000000")),
            discount_rate: Some(pct("0.20")),
            safe_type: SafeType::PreMoney,
        };
        let quote = safe.quote_conversion(d("1.00"), d("10000000")).unwrap();
        assert_eq!(quote.basis, ConversionBasis::ValuationCap);
        assert_eq!(quote.conversion_price, d("0.5"));
        assert_eq!(quote.shares_issued, d("200000"));

        // A cap far above the round valuation leaves the discount in charge.
        let high_cap = SafeInstrument {
            valuation_cap: Some(d("50000000")),
            ..safe
        };
        let quote = high_cap.quote_conversion(d("1.00"), d("10000000")).unwrap();
        assert_eq!(quote.basis, ConversionBasis::Discount);
        assert_eq!(quote.shares_issued, d("125000"));
    }

    #[test]
    fn test_safe_conversion_never_worse_than_round_price() {
        let safe = SafeInstrument {
            investment_amount: d("100000"),
            valuation_cap: Some(d("50000000")),
            discount_rate: None,
            safe_type: SafeType::PostMoney,
        };
        let quote = safe.quote_conversion(d("1.00"), d("10000000")).unwrap();
        assert_eq!(quote.basis, ConversionBasis::RoundPrice);
        assert_eq!(quote.shares_issued, d("100000"));
    }

    #[test]
    fn test_priced_round_math_tolerance() {
        let round = PricedRoundInstrument {
            investment_amount: d("5000000"),
            pre_money_valuation: d("20000000"),
            price_per_share: d("2.00"),
            shares_issued: d("2500000"),
        };
        assert!(round.validate().is_ok());
        assert_eq!(round.post_money_valuation(), d("25000000"));

        let within = PricedRoundInstrument {
            shares_issued: d("2520000"),
            ..round.clone()
        };
        assert!(within.validate().is_ok());

        let beyond = PricedRoundInstrument {
            shares_issued: d("2600000"),
            ..round
        };
        assert!(matches!(
            beyond.validate(),
            Err(ValidationError::PricedRoundMismatch { .. })
        ));
    }

    #[test]
    fn test_note_simple_interest_accrual() {
        let note = ConvertibleNoteInstrument {
            principal_amount: d("500000"),
            interest_rate: pct("0.05"),
            interest_type: InterestType::Simple,
            issue_date: date(2023, 1, 1),
            maturity_date: date(2026, 1, 1),
            valuation_cap: Some(d("8000000")),
            discount_rate: None,
        };
        assert!(note.validate().is_ok());
        // No time elapsed, no interest.
        let accrued = note.accrued_amount(date(2023, 1, 1)).unwrap();
        assert_eq!(accrued, d("500000"));

        let two_years = note.accrued_amount(date(2025, 1, 1)).unwrap();
        // 731 days / 365.25 years at 5% simple.
        let expected = d("500000") + d("500000") * d("0.05") * (d("731") / d("365.25"));
        assert_eq!(two_years, expected);
    }

    #[test]
    fn test_note_compound_interest_exceeds_simple() {
        let note = ConvertibleNoteInstrument {
            principal_amount: d("500000"),
            interest_rate: pct("0.08"),
            interest_type: InterestType::Compound,
            issue_date: date(2020, 1, 1),
            maturity_date: date(2030, 1, 1),
            valuation_cap: None,
            discount_rate: Some(pct("0.2")),
        };
        let simple = ConvertibleNoteInstrument {
            interest_type: InterestType::Simple,
            ..note.clone()
        };
        let as_of = date(2025, 1, 1);
        assert!(note.accrued_amount(as_of).unwrap() > simple.accrued_amount(as_of).unwrap());
    }

    #[test]
    fn test_note_dates_validated() {
        let note = ConvertibleNoteInstrument {
            principal_amount: d("1"),
            interest_rate: pct("0.05"),
            interest_type: InterestType::Simple,
            issue_date: date(2024, 1, 1),
            maturity_date: date(2024, 1, 1),
            valuation_cap: Some(d("1")),
            discount_rate: None,
        };
        assert!(matches!(
            note.validate(),
            Err(ValidationError::InvalidDateRange { .. })
        ));
    }

    #[test]
    fn test_warrant_validation() {
        let warrant = WarrantInstrument {
            shares_purchasable: d("100000"),
            exercise_price: d("1.00"),
            share_class_id: ShareClassId::new("common").unwrap(),
            issue_date: date(2024, 1, 1),
            expiration_date: Some(date(2023, 1, 1)),
        };
        assert!(warrant.validate().is_err());
    }

    #[test]
    fn test_instrument_tagged_serde() {
        let json = serde_json::json!({
            "type": "SAFE",
            "investment_amount": "250000",
            "valuation_cap": "10000000"
        });
        let instrument: Instrument = serde_json::from_value(json).unwrap();
        assert!(matches!(instrument, Instrument::Safe(_)));
        assert!(instrument.validate().is_ok());
    }
}
