//! Fixed-point monetary amounts.
//!
//! Every amount in the bank carries exactly two fraction digits and uses
//! decimal arithmetic. Binary floating point never touches a balance.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// Number of fraction digits carried by every amount.
pub const MONEY_SCALE: u32 = 2;

/// Largest magnitude an amount may hold; matches the `NUMERIC(15, 2)` columns.
pub const MONEY_MAX: Decimal = Decimal::from_parts(2_764_472_319, 232_830, 0, false, 2);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("not a valid amount: '{0}'")]
    Malformed(String),

    #[error("amount '{0}' has more than two fraction digits")]
    TooPrecise(String),

    #[error("amount '{0}' is outside the supported range")]
    OutOfRange(String),
}

impl From<MoneyError> for DomainError {
    fn from(value: MoneyError) -> Self {
        DomainError::validation(value.to_string())
    }
}

/// A signed monetary amount with exactly two fraction digits.
///
/// Signed because checking balances may dip below zero within their overdraft
/// limit; operation amounts are validated as positive by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Build an amount from a decimal, rejecting sub-cent precision.
    pub fn new(value: Decimal) -> Result<Self, MoneyError> {
        if value.normalize().scale() > MONEY_SCALE {
            return Err(MoneyError::TooPrecise(value.to_string()));
        }
        if value.abs() > MONEY_MAX {
            return Err(MoneyError::OutOfRange(value.to_string()));
        }
        Ok(Self::rescaled(value))
    }

    /// Build an amount from a whole number of cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, MONEY_SCALE))
    }

    /// Build an amount from whole currency units.
    pub fn from_units(units: i64) -> Self {
        Self::rescaled(Decimal::from(units))
    }

    /// Parse user input. Accepts `,` as the decimal separator.
    pub fn parse(input: &str) -> Result<Self, MoneyError> {
        let cleaned = input.trim().replace(',', ".");
        let value = Decimal::from_str(&cleaned)
            .map_err(|_| MoneyError::Malformed(input.trim().to_string()))?;
        Self::new(value)
    }

    /// Multiply by a decimal factor, rounding half away from zero to cents.
    pub fn scaled(self, factor: Decimal) -> Self {
        Self::rescaled(
            (self.0 * factor)
                .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Sum that stays within `MONEY_MAX`; `None` otherwise.
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).and_then(Self::bounded)
    }

    /// Difference that stays within `MONEY_MAX`; `None` otherwise.
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).and_then(Self::bounded)
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    fn bounded(value: Decimal) -> Option<Self> {
        (value.abs() <= MONEY_MAX).then(|| Self::rescaled(value))
    }

    fn rescaled(mut value: Decimal) -> Self {
        value.rescale(MONEY_SCALE);
        Self(value)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Self::rescaled(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        *self = *self + rhs;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Self::rescaled(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        *self = *self - rhs;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Self(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}
