//! Currency rounding helpers
//!
//! The engine works in a single operating currency with a configurable
//! decimal precision. Comparisons against zero always go through the
//! epsilon of that precision, one digit finer than the displayed amounts.

use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, RoundingMode};

/// Rounding and comparison rules for the operating currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Currency {
    precision: i64,
}

impl Currency {
    pub fn new(precision: u32) -> Self {
        Self {
            precision: i64::from(precision),
        }
    }

    pub fn precision(&self) -> i64 {
        self.precision
    }

    /// Rounds an amount to the currency precision, half away from zero.
    pub fn round(&self, amount: &BigDecimal) -> BigDecimal {
        amount.with_scale_round(self.precision, RoundingMode::HalfUp)
    }

    /// Smallest amount considered distinct from zero: `10^-(precision+1)`.
    pub fn epsilon(&self) -> BigDecimal {
        BigDecimal::new(BigInt::from(1), self.precision + 1)
    }

    /// True when the amount is indistinguishable from zero.
    pub fn is_negligible(&self, amount: &BigDecimal) -> bool {
        amount.abs() < self.epsilon()
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::new(2)
    }
}
