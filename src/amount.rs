use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A float that has no centavo representation.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum AmountError {
    #[error("amount {0} is not a finite number")]
    NotFinite(f64),
    #[error("amount {0} is out of range")]
    OutOfRange(f64),
}

/// Currency amount in centavos (2 decimal places), stored as a scaled integer.
///
/// Serializes as a plain JSON number (`500.0`) to match the wire shape of
/// `transferValue` and `balance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Amount(i64);

impl Amount {
    const SCALE: i64 = 100;

    pub const ZERO: Amount = Amount(0);

    /// Round to the nearest centavo. Fails on NaN, infinities and values whose
    /// centavo count does not fit in an `i64`.
    pub fn from_float(value: f64) -> Result<Self, AmountError> {
        if !value.is_finite() {
            return Err(AmountError::NotFinite(value));
        }
        let scaled = (value * Self::SCALE as f64).round();
        // i64::MIN as f64 is exact, i64::MAX as f64 rounds up to 2^63
        if scaled <= i64::MIN as f64 || scaled >= i64::MAX as f64 {
            return Err(AmountError::OutOfRange(value));
        }
        Ok(Amount(scaled as i64))
    }

    pub fn from_scaled(value: i64) -> Self {
        Amount(value)
    }

    /// Whole units, e.g. `Amount::from_units(500)` is `500.00`.
    pub fn from_units(value: i64) -> Self {
        Amount(value * Self::SCALE)
    }

    pub fn scaled(self) -> i64 {
        self.0
    }

    pub fn to_float(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Amount)
    }
}

impl TryFrom<f64> for Amount {
    type Error = AmountError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Amount::from_float(value)
    }
}

impl From<Amount> for f64 {
    fn from(value: Amount) -> Self {
        value.to_float()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / Self::SCALE as u64;
        let frac = abs % Self::SCALE as u64;
        write!(f, "{sign}{whole}.{frac:02}")
    }
}
