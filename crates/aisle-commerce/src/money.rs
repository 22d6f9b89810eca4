//! Prices and discounts in integer minor units.
//!
//! Amounts are integers in the currency's minor unit. Discount math never
//! touches floating point; decimals appear only when parsing configuration
//! and when rendering for display.

use crate::error::FulfillmentError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Currencies a store can price in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Currency {
    #[default]
    USD,
    EUR,
    GBP,
    JPY,
    CAD,
    INR,
}

/// Code, symbol and minor-unit exponent per currency.
const CURRENCIES: [(Currency, &str, &str, u32); 6] = [
    (Currency::USD, "USD", "$", 2),
    (Currency::EUR, "EUR", "\u{20ac}", 2),
    (Currency::GBP, "GBP", "\u{00a3}", 2),
    (Currency::JPY, "JPY", "\u{00a5}", 0),
    (Currency::CAD, "CAD", "CA$", 2),
    (Currency::INR, "INR", "\u{20b9}", 2),
];

impl Currency {
    fn entry(&self) -> (Currency, &'static str, &'static str, u32) {
        CURRENCIES[*self as usize]
    }

    /// ISO code, e.g. `USD`.
    pub fn code(&self) -> &'static str {
        self.entry().1
    }

    pub fn symbol(&self) -> &'static str {
        self.entry().2
    }

    /// Digits after the decimal point; JPY has none.
    pub fn decimal_places(&self) -> u32 {
        self.entry().3
    }

    /// Case-insensitive lookup by ISO code.
    pub fn from_code(code: &str) -> Option<Self> {
        CURRENCIES
            .iter()
            .find(|(_, c, _, _)| c.eq_ignore_ascii_case(code))
            .map(|(currency, _, _, _)| *currency)
    }

    fn scale(&self) -> i64 {
        10_i64.pow(self.decimal_places())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// An amount tagged with its currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Money {
    /// Cents for USD, yen for JPY.
    pub minor: i64,
    pub currency: Currency,
}

impl Money {
    pub fn new(minor: i64, currency: Currency) -> Self {
        Self { minor, currency }
    }

    /// Convert a decimal amount from configuration, rounding to the
    /// nearest minor unit.
    ///
    /// ```
    /// use aisle_commerce::money::{Money, Currency};
    /// let price = Money::from_decimal(3.49, Currency::USD);
    /// assert_eq!(price.minor, 349);
    /// ```
    pub fn from_decimal(amount: f64, currency: Currency) -> Self {
        let minor = (amount * currency.scale() as f64).round() as i64;
        Self::new(minor, currency)
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    pub fn is_negative(&self) -> bool {
        self.minor < 0
    }

    /// Decimal view of the amount. Display only.
    pub fn to_decimal(&self) -> f64 {
        self.minor as f64 / self.currency.scale() as f64
    }

    /// Format as a display string (e.g., "$3.49").
    pub fn display(&self) -> String {
        let scale = self.currency.scale();
        let sign = if self.minor < 0 { "-" } else { "" };
        let abs = self.minor.unsigned_abs();
        let places = self.currency.decimal_places() as usize;
        if places == 0 {
            return format!("{}{}{}", sign, self.currency.symbol(), abs);
        }
        format!(
            "{}{}{}.{:0places$}",
            sign,
            self.currency.symbol(),
            abs / scale as u64,
            abs % scale as u64,
        )
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, FulfillmentError> {
        self.same_currency(other)?;
        self.minor
            .checked_add(other.minor)
            .map(|minor| Money::new(minor, self.currency))
            .ok_or(FulfillmentError::Overflow)
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money, FulfillmentError> {
        self.same_currency(other)?;
        self.minor
            .checked_sub(other.minor)
            .map(|minor| Money::new(minor, self.currency))
            .ok_or(FulfillmentError::Overflow)
    }

    /// Line total for `factor` units.
    pub fn checked_mul(&self, factor: i64) -> Result<Money, FulfillmentError> {
        self.minor
            .checked_mul(factor)
            .map(|minor| Money::new(minor, self.currency))
            .ok_or(FulfillmentError::Overflow)
    }

    /// The share of this amount given in basis points (1/100 of a percent),
    /// rounded half away from zero to the nearest minor unit.
    pub fn basis_points(&self, bps: u32) -> Money {
        let product = self.minor as i128 * bps as i128;
        let rounded = if product >= 0 {
            (product + 5_000) / 10_000
        } else {
            (product - 5_000) / 10_000
        };
        Money::new(rounded as i64, self.currency)
    }

    /// Total of `iter`; zero for an empty iterator.
    pub fn sum<'a>(
        mut iter: impl Iterator<Item = &'a Money>,
        currency: Currency,
    ) -> Result<Money, FulfillmentError> {
        iter.try_fold(Money::zero(currency), |acc, m| acc.checked_add(m))
    }

    fn same_currency(&self, other: &Money) -> Result<(), FulfillmentError> {
        if self.currency != other.currency {
            return Err(FulfillmentError::CurrencyMismatch {
                expected: self.currency.code().to_string(),
                got: other.currency.code().to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}
