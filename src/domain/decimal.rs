//! Lossless decimal numeric type backed by rust_decimal.
//!
//! Prices and sizes are decimals end to end; the delta codec additionally
//! needs access to the normalized scale and mantissa of a value.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lossless decimal numeric type for prices and sizes.
///
/// Backed by rust_decimal to avoid floating-point drift.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::float")] RustDecimal);

impl Decimal {
    pub const ZERO: Decimal = Decimal(RustDecimal::ZERO);

    pub fn new(value: RustDecimal) -> Self {
        Decimal(value)
    }

    /// Parse a Decimal from a string losslessly.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s).map(Decimal)
    }

    /// Format as a canonical string: no exponent notation, no trailing zeros.
    pub fn to_canonical_string(&self) -> String {
        format!("{}", self.0.normalize())
    }

    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Number of fractional digits after normalization.
    pub fn scale(&self) -> u32 {
        self.0.normalize().scale()
    }

    /// Integer mantissa after normalization: `self == mantissa * 10^-scale`.
    pub fn mantissa(&self) -> i128 {
        self.0.normalize().mantissa()
    }

    /// Reconstruct a value from its normalized mantissa and scale.
    pub fn from_mantissa_scale(mantissa: i128, scale: u32) -> Result<Self, rust_decimal::Error> {
        RustDecimal::try_from_i128_with_scale(mantissa, scale).map(Decimal)
    }

    /// Integral part, truncated toward zero.
    pub fn int_part(&self) -> i64 {
        self.0.trunc().to_i64().unwrap_or(0)
    }

    /// Round to the given number of decimal places.
    pub fn round_dp(&self, dp: u32) -> Self {
        Decimal(self.0.round_dp(dp))
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

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Decimal(RustDecimal::from(value))
    }
}

impl std::ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Decimal {
    fn add_assign(&mut self, rhs: Decimal) {
        self.0 += rhs.0;
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl std::ops::Div<i64> for Decimal {
    type Output = Decimal;

    fn div(self, rhs: i64) -> Decimal {
        Decimal(self.0 / RustDecimal::from(rhs))
    }
}
