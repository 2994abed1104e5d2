//! Internal rate of return over dated cash flows (XIRR).
//!
//! Newton-Raphson on `NPV(r) = Σ cf / (1 + r)^(days / 365)` with the rate
//! clamped to [-0.99, 100] between iterations.

use crate::domain::Decimal;
use chrono::NaiveDate;
use rust_decimal::Decimal as RustDecimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const NEWTON_MAX_ITERATIONS: u32 = 50;
const NEWTON_EPSILON: RustDecimal = dec!(0.0000001);
const STEP_EPSILON: RustDecimal = dec!(0.000000000001);
const INITIAL_GUESS: RustDecimal = dec!(0.10);
const MIN_RATE: RustDecimal = dec!(-0.99);
const MAX_RATE: RustDecimal = dec!(100);
const DAYS_PER_YEAR: RustDecimal = dec!(365);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrrError {
    #[error("IRR requires at least 2 cash flows")]
    InsufficientCashFlows,
    #[error("IRR requires both an outflow and an inflow")]
    NoSignChange,
    #[error("IRR requires cash flows on more than one date")]
    NoTimeElapsed,
    #[error("IRR did not converge after {iterations} iterations")]
    ConvergenceFailure { iterations: u32 },
    #[error("arithmetic overflow evaluating NPV at rate {rate}")]
    Overflow { rate: Decimal },
}

/// A signed cash flow: investments negative, distributions positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedCashFlow {
    pub date: NaiveDate,
    pub amount: Decimal,
}

impl DatedCashFlow {
    pub fn new(date: NaiveDate, amount: Decimal) -> Self {
        Self { date, amount }
    }
}

/// Annualized IRR, as a fraction (0.25 = 25%).
///
/// A total loss (no inflow at all) returns -1.
pub fn xirr(flows: &[DatedCashFlow]) -> Result<Decimal, IrrError> {
    if flows.len() < 2 {
        return Err(IrrError::InsufficientCashFlows);
    }
    let has_outflow = flows.iter().any(|f| f.amount.is_negative());
    let has_inflow = flows.iter().any(|f| f.amount.is_positive());
    if !has_outflow {
        return Err(IrrError::NoSignChange);
    }
    if !has_inflow {
        return Ok(-Decimal::one());
    }

    let Some(start) = flows.iter().map(|f| f.date).min() else {
        return Err(IrrError::InsufficientCashFlows);
    };
    let terms: Vec<(RustDecimal, RustDecimal)> = flows
        .iter()
        .map(|f| {
            let days = RustDecimal::from((f.date - start).num_days());
            (days / DAYS_PER_YEAR, f.amount.inner())
        })
        .collect();
    if terms.iter().all(|(t, _)| t.is_zero()) {
        return Err(IrrError::NoTimeElapsed);
    }

    let scale: RustDecimal = terms.iter().map(|(_, cf)| cf.abs()).sum();
    let tolerance = NEWTON_EPSILON * scale.max(RustDecimal::ONE);
    let mut rate = INITIAL_GUESS;

    for iteration in 0..NEWTON_MAX_ITERATIONS {
        let (npv, dnpv) = npv_and_derivative(&terms, rate)?;

        if npv.abs() < tolerance {
            tracing::debug!(iterations = iteration, rate = %rate, "IRR converged");
            return Ok(Decimal::new(rate));
        }
        if dnpv.is_zero() {
            return Err(IrrError::ConvergenceFailure {
                iterations: iteration,
            });
        }

        let step = npv / dnpv;
        rate = (rate - step).clamp(MIN_RATE, MAX_RATE);
        if step.abs() < STEP_EPSILON {
            return Ok(Decimal::new(rate));
        }
    }

    Err(IrrError::ConvergenceFailure {
        iterations: NEWTON_MAX_ITERATIONS,
    })
}

fn npv_and_derivative(
    terms: &[(RustDecimal, RustDecimal)],
    rate: RustDecimal,
) -> Result<(RustDecimal, RustDecimal), IrrError> {
    let overflow = || IrrError::Overflow {
        rate: Decimal::new(rate),
    };
    let one_plus_r = RustDecimal::ONE + rate;
    let mut npv = RustDecimal::ZERO;
    let mut dnpv = RustDecimal::ZERO;

    for (t, cf) in terms {
        let discount = one_plus_r.checked_powd(*t).ok_or_else(overflow)?;
        if discount.is_zero() {
            continue;
        }
        npv += cf.checked_div(discount).ok_or_else(overflow)?;
        if !t.is_zero() {
            let slope = one_plus_r.checked_powd(*t + RustDecimal::ONE).ok_or_else(overflow)?;
            dnpv -= (*t * cf).checked_div(slope).ok_or_else(overflow)?;
        }
    }
    Ok((npv, dnpv))
}
