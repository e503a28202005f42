//! Fixed-point monetary amount backed by rust_decimal.
//!
//! Provides canonical parsing from strings and formatting without exponent notation.
//! All balances, bets, payouts, and fees in the system are `Amount`s.

use rust_decimal::Decimal as RustDecimal;
use std::fmt;
use std::str::FromStr;

/// Maximum number of decimal places accepted for monetary values.
pub const MONEY_SCALE: u32 = 6;

/// Lossless fixed-point monetary amount.
///
/// Backed by rust_decimal to avoid floating-point drift. Debits are negative,
/// credits positive. API payloads carry amounts as canonical decimal strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(RustDecimal);

impl Amount {
    /// Create an Amount from a RustDecimal.
    pub fn new(value: RustDecimal) -> Self {
        Amount(value)
    }

    /// Parse an Amount from a string losslessly.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s).map(Amount)
    }

    /// Format the Amount as a canonical string (no exponent notation).
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
        Amount(RustDecimal::ZERO)
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
        Amount(self.0.abs())
    }

    /// Round to the money scale (6 decimal places, banker's rounding).
    pub fn round_money(&self) -> Self {
        Amount(self.0.round_dp(MONEY_SCALE))
    }

    /// Returns true if the value has no more than [`MONEY_SCALE`] decimal places.
    pub fn is_money_scale(&self) -> bool {
        self.0.normalize().scale() <= MONEY_SCALE
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Amount {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Amount {
    fn from(value: RustDecimal) -> Self {
        Amount(value)
    }
}

impl From<Amount> for RustDecimal {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl std::ops::Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Amount {
    type Output = Amount;

    fn mul(self, rhs: Amount) -> Amount {
        Amount(self.0 * rhs.0)
    }
}

impl std::ops::Div for Amount {
    type Output = Amount;

    fn div(self, rhs: Amount) -> Amount {
        Amount(self.0 / rhs.0)
    }
}

impl std::ops::Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}
