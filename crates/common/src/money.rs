//! Monetary amounts.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a decimal amount string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid amount '{input}': {reason}")]
pub struct MoneyParseError {
    pub input: String,
    pub reason: &'static str,
}

/// Money amount represented in cents to avoid floating point issues.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = 10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from a whole-unit value.
    pub fn from_major(units: i64) -> Self {
        Self { cents: units * 100 }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Parses a decimal string such as `"150000.00"` or `"12.5"`.
    ///
    /// At most two fractional digits are accepted.
    pub fn parse(input: &str) -> Result<Self, MoneyParseError> {
        let err = |reason| MoneyParseError {
            input: input.to_string(),
            reason,
        };

        let trimmed = input.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));

        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err("expected digits before the decimal point"));
        }
        if !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err("expected digits after the decimal point"));
        }
        if frac.len() > 2 {
            return Err(err("more than two fractional digits"));
        }

        let whole: i64 = whole.parse().map_err(|_| err("amount out of range"))?;
        let frac_cents = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| err("amount out of range"))? * 10,
            _ => frac.parse::<i64>().map_err(|_| err("amount out of range"))?,
        };

        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac_cents))
            .ok_or_else(|| err("amount out of range"))?;

        Ok(Self {
            cents: if negative { -cents } else { cents },
        })
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the amount as a float, for JSON payloads that expect one.
    pub fn as_f64(&self) -> f64 {
        self.cents as f64 / 100.0
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Adds two amounts, returning `None` on overflow.
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.cents.checked_add(rhs.cents).map(Money::from_cents)
    }

    /// Subtracts `rhs`, returning `None` on overflow.
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.cents.checked_sub(rhs.cents).map(Money::from_cents)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl std::str::FromStr for Money {
    type Err = MoneyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
