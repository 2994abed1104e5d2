//! Lossless decimal numeric type backed by rust_decimal.
//!
//! Every share count, money amount and multiple in the cap table flows through
//! this type. Floating point never touches a value that feeds a distribution.

use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

/// Lossless decimal numeric type for financial calculations.
///
/// Serializes to a JSON string so that amounts survive a round trip through
/// any renderer without binary float drift.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Decimal(RustDecimal);

impl Decimal {
    /// Create a Decimal from a RustDecimal.
    pub const fn new(value: RustDecimal) -> Self {
        Decimal(value)
    }

    /// Parse a Decimal from a string losslessly.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s).map(Decimal)
    }

    /// Format the Decimal as a canonical string (no exponent notation).
    pub fn to_canonical_string(&self) -> String {
        let normalized = self.0.normalize();
        format!("{}", normalized)
    }

    /// Get the underlying RustDecimal.
    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    /// The additive identity (0).
    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    /// The multiplicative identity (1).
    pub fn one() -> Self {
        Decimal(RustDecimal::ONE)
    }

    /// Returns the value 100.
    pub fn hundred() -> Self {
        Decimal(RustDecimal::ONE_HUNDRED)
    }

    /// Returns true if the value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the value is > 0.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    /// Returns true if the value is < 0.
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    /// Absolute value.
    pub fn abs(&self) -> Self {
        Decimal(self.0.abs())
    }

    /// Round half to even at `dp` decimal places.
    pub fn round_dp(self, dp: u32) -> Self {
        Decimal(self.0.round_dp(dp))
    }

    pub fn min(self, other: Decimal) -> Decimal {
        if self <= other {
            self
        } else {
            other
        }
    }

    pub fn max(self, other: Decimal) -> Decimal {
        if self >= other {
            self
        } else {
            other
        }
    }

    /// `self / denominator`, or zero when the denominator is zero.
    ///
    /// Used for every percentage and pro-rata ratio so that degenerate cap
    /// tables (no shares, no proceeds) resolve to zero instead of panicking.
    pub fn checked_ratio(self, denominator: Decimal) -> Decimal {
        if denominator.is_zero() {
            Decimal::zero()
        } else {
            self / denominator
        }
    }

    /// Express a fraction as a percentage (0.25 -> 25).
    pub fn as_percent(self) -> Decimal {
        self * Decimal::hundred()
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Decimal {
    fn from(value: RustDecimal) -> Self {
        Decimal(value)
    }
}

impl From<Decimal> for RustDecimal {
    fn from(value: Decimal) -> Self {
        value.0
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Decimal(RustDecimal::from(value))
    }
}

impl From<u64> for Decimal {
    fn from(value: u64) -> Self {
        Decimal(RustDecimal::from(value))
    }
}

// Arithmetic operations
impl std::ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 * rhs.0)
    }
}

impl std::ops::Div for Decimal {
    type Output = Decimal;

    fn div(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 / rhs.0)
    }
}

impl std::ops::Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

impl std::ops::AddAssign for Decimal {
    fn add_assign(&mut self, rhs: Decimal) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Decimal {
    fn sub_assign(&mut self, rhs: Decimal) {
        self.0 -= rhs.0;
    }
}

impl Sum for Decimal {
    fn sum<I: Iterator<Item = Decimal>>(iter: I) -> Self {
        iter.fold(Decimal::zero(), |acc, x| acc + x)
    }
}

impl<'a> Sum<&'a Decimal> for Decimal {
    fn sum<I: Iterator<Item = &'a Decimal>>(iter: I) -> Self {
        iter.fold(Decimal::zero(), |acc, x| acc + *x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_decimal_canonical_no_exponent() {
        let decimal = d("1000000.000");
        let formatted = decimal.to_canonical_string();
        assert!(!formatted.contains('e'));
        assert_eq!(formatted, "1000000");
    }

    #[test]
    fn test_decimal_arithmetic() {
        let a = d("10.5");
        let b = d("2.5");

        assert_eq!((a + b).to_canonical_string(), "13");
        assert_eq!((a - b).to_canonical_string(), "8");
        assert_eq!((a * b).to_canonical_string(), "26.25");
        assert_eq!((a / b).to_canonical_string(), "4.2");
    }

    #[test]
    fn test_decimal_assign_ops_and_sum() {
        let mut total = Decimal::zero();
        total += d("3");
        total -= d("1");
        assert_eq!(total, d("2"));

        let values = vec![d("1.1"), d("2.2"), d("3.3")];
        let sum: Decimal = values.iter().sum();
        assert_eq!(sum, d("6.6"));
    }

    #[test]
    fn test_checked_ratio_zero_denominator() {
        assert_eq!(d("5").checked_ratio(Decimal::zero()), Decimal::zero());
        assert_eq!(d("5").checked_ratio(d("20")), d("0.25"));
    }

    #[test]
    fn test_decimal_json_serialization_is_exact_string() {
        let decimal = d("123.456");
        let json = serde_json::to_value(decimal).unwrap();
        assert!(json.is_string());
        assert_eq!(json, serde_json::json!("123.456"));

        let back: Decimal = serde_json::from_str("\"0.1\"").unwrap();
        assert_eq!(back, d("0.1"));
    }

    #[test]
    fn test_decimal_min_max() {
        assert_eq!(d("1").min(d("2")), d("1"));
        assert_eq!(d("1").max(d("2")), d("2"));
    }

    #[test]
    fn test_decimal_sign_predicates() {
        assert!(d("0.01").is_positive());
        assert!(d("-0.01").is_negative());
        assert!(!Decimal::zero().is_positive());
        assert!(!Decimal::zero().is_negative());
    }

    #[test]
    fn test_as_percent() {
        assert_eq!(d("0.2").as_percent(), d("20"));
    }
}
