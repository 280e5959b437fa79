//! Money type for monetary values with fixed two-digit precision.
//!
//! This module provides the `Money` type which wraps `Decimal` so that
//! repeated summation never accumulates binary floating point drift.
//! Currency is a formatting concern only: selecting a display currency never
//! changes the stored amount or the aggregates derived from it.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;
use tracing::warn;

/// The currency used when an unknown currency code is requested.
pub const BASE_CURRENCY: &str = "USD";

/// Display symbols for the currency codes the dashboard offers.
const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("USD", "$"),
    ("EUR", "€"),
    ("GBP", "£"),
    ("INR", "₹"),
    ("JPY", "¥"),
];

/// Represents a monetary value.
///
/// This type wraps `Decimal` and rescales to two fractional digits on
/// construction. Comparisons and arithmetic are decimal-exact.
///
/// # Examples
///
/// ```
/// # use finsync::Money;
/// # use std::str::FromStr;
/// let a = Money::from_str("1000").unwrap();
/// let b = Money::from_str("300").unwrap();
/// assert_eq!((a - b), Money::from_str("700.00").unwrap());
/// assert_eq!(a.format("USD"), "$1,000.00");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Creates a new `Money` from a Decimal value, rounded to two fractional
    /// digits (banker's rounding).
    pub fn new(value: Decimal) -> Self {
        Self(value.round_dp(2))
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.is_zero()
    }

    /// Formats the amount with the symbol for `currency_code` and thousands
    /// separators, e.g. `-$1,234.56`.
    ///
    /// Unknown currency codes fail closed: a warning is logged and the base
    /// currency symbol is used. This never panics into a render path.
    pub fn format(&self, currency_code: &str) -> String {
        let symbol = match symbol_for(currency_code) {
            Some(symbol) => symbol,
            None => {
                warn!("unknown currency code '{currency_code}', falling back to {BASE_CURRENCY}");
                // The table always contains the base currency.
                symbol_for(BASE_CURRENCY).unwrap_or("$")
            }
        };
        let (sign, num) = if self.is_negative() {
            ("-", self.0.abs())
        } else {
            ("", self.0)
        };
        // f64 is only used to render grouping separators, never for arithmetic.
        format!(
            "{sign}{symbol}{}",
            format_num::format_num!(",.2", num.to_f64().unwrap_or_default())
        )
    }
}

fn symbol_for(currency_code: &str) -> Option<&'static str> {
    CURRENCY_SYMBOLS
        .iter()
        .find(|(code, _)| *code == currency_code)
        .map(|(_, symbol)| *symbol)
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Money::new(Decimal::from_str(s.trim())?))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut value = self.0;
        value.rescale(2);
        write!(f, "{value}")
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.value()
    }
}
