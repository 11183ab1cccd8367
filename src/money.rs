//! Fixed-precision monetary amounts in minor units.
//!
//! Every amount the engine computes with is an integer number of minor units
//! (cents for USD). Decimal strings only appear at the boundaries: catalog
//! price strings are parsed with [`Money::from_decimal_string`], and wire
//! values are the minor-unit integer rendered as a decimal string. Percentage
//! computations funnel through a single rounding point,
//! [`Money::round_half_even`].

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("malformed amount {0:?}")]
    Malformed(String),

    #[error("amount {0:?} has more than {1} decimal places")]
    ExcessPrecision(String, u32),

    #[error("amount out of range")]
    Overflow,
}

/// An exact, non-negative monetary amount in minor units.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_minor(units: i64) -> Self {
        Money(units)
    }

    pub fn minor(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Parses a decimal string (`"18.99"`) into minor units at the given
    /// precision. Rejects negative values, malformed input, and strings with
    /// more fractional digits than `decimals`.
    pub fn from_decimal_string(s: &str, decimals: u32) -> Result<Money, MoneyError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(MoneyError::Malformed(s.to_string()));
        }

        let (whole, frac) = match trimmed.split_once('.') {
            Some((w, f)) => (w, f),
            None => (trimmed, ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(MoneyError::Malformed(s.to_string()));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(MoneyError::Malformed(s.to_string()));
        }
        if frac.len() as u32 > decimals {
            return Err(MoneyError::ExcessPrecision(s.to_string(), decimals));
        }

        let scale = 10i64.checked_pow(decimals).ok_or(MoneyError::Overflow)?;
        let whole_units: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| MoneyError::Overflow)?
        };
        let mut frac_units: i64 = if frac.is_empty() {
            0
        } else {
            frac.parse().map_err(|_| MoneyError::Overflow)?
        };
        // "18.9" at two decimals is 1890, not 189.
        for _ in frac.len() as u32..decimals {
            frac_units = frac_units.checked_mul(10).ok_or(MoneyError::Overflow)?;
        }

        whole_units
            .checked_mul(scale)
            .and_then(|w| w.checked_add(frac_units))
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }

    /// The minor-unit integer as a decimal string: no separators, no leading
    /// zeroes, `"0"` for zero. This is the wire representation.
    pub fn to_minor_string(self) -> String {
        self.0.to_string()
    }

    pub fn add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }

    /// Subtraction that floors at zero, used for discount capping.
    pub fn saturating_sub(self, other: Money) -> Money {
        Money((self.0 - other.0).max(0))
    }

    pub fn mul_quantity(self, quantity: u32) -> Money {
        Money(self.0.saturating_mul(i64::from(quantity)))
    }

    pub fn min(self, other: Money) -> Money {
        Money(self.0.min(other.0))
    }

    /// The single rounding point for percentage computations: banker's
    /// rounding of a raw minor-unit product back to an integer amount.
    pub fn round_half_even(raw: Decimal) -> Result<Money, MoneyError> {
        raw.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            .to_string()
            .parse::<i64>()
            .map(Money)
            .map_err(|_| MoneyError::Overflow)
    }

    /// `pct` percent of this amount, rounded half-even.
    pub fn percent(self, pct: Decimal) -> Result<Money, MoneyError> {
        Money::round_half_even(Decimal::from(self.0) * pct / Decimal::from(100))
    }

    /// Display string in major units: `$37.98` for 3798 at two decimals.
    pub fn format_display(self, symbol: &str, decimals: u32) -> String {
        if decimals == 0 {
            return format!("{}{}", symbol, self.0);
        }
        let scale = 10i64.pow(decimals);
        format!(
            "{}{}.{:0width$}",
            symbol,
            self.0 / scale,
            (self.0 % scale).abs(),
            width = decimals as usize
        )
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_minor_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Money, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<i64>()
            .map(Money)
            .map_err(|_| serde::de::Error::custom(format!("invalid minor-unit amount {s:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_plain_integers() {
        assert_eq!(Money::from_decimal_string("20", 2).unwrap().minor(), 2000);
        assert_eq!(Money::from_decimal_string("0", 2).unwrap().minor(), 0);
    }

    #[test]
    fn parses_fractional_amounts() {
        assert_eq!(Money::from_decimal_string("18.99", 2).unwrap().minor(), 1899);
        assert_eq!(Money::from_decimal_string("18.9", 2).unwrap().minor(), 1890);
        assert_eq!(Money::from_decimal_string(".5", 2).unwrap().minor(), 50);
        assert_eq!(Money::from_decimal_string("14.", 2).unwrap().minor(), 1400);
    }

    #[test]
    fn rejects_excess_precision() {
        assert!(matches!(
            Money::from_decimal_string("1.999", 2),
            Err(MoneyError::ExcessPrecision(_, 2))
        ));
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["", " ", "abc", "1,50", "-3.00", "+2", "1.2.3", "1e2", "."] {
            assert!(
                Money::from_decimal_string(bad, 2).is_err(),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn minor_string_has_no_leading_zeroes() {
        assert_eq!(Money::from_minor(0).to_minor_string(), "0");
        assert_eq!(Money::from_minor(7).to_minor_string(), "7");
        assert_eq!(Money::from_minor(3798).to_minor_string(), "3798");
    }

    #[test]
    fn percent_uses_bankers_rounding() {
        // 2.5 and 3.5 cents round to the even neighbour.
        assert_eq!(Money::from_minor(25).percent(dec!(10)).unwrap().minor(), 2);
        assert_eq!(Money::from_minor(35).percent(dec!(10)).unwrap().minor(), 4);
        assert_eq!(
            Money::from_minor(2000).percent(dec!(10)).unwrap().minor(),
            200
        );
    }

    #[test]
    fn saturating_sub_floors_at_zero() {
        let five = Money::from_minor(500);
        let eight = Money::from_minor(800);
        assert_eq!(five.saturating_sub(eight), Money::ZERO);
        assert_eq!(eight.saturating_sub(five).minor(), 300);
    }

    #[test]
    fn display_formatting() {
        assert_eq!(Money::from_minor(3798).format_display("$", 2), "$37.98");
        assert_eq!(Money::from_minor(5).format_display("$", 2), "$0.05");
        assert_eq!(Money::from_minor(42).format_display("¥", 0), "¥42");
    }

    #[test]
    fn serde_round_trip() {
        let m = Money::from_minor(1899);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, "\"1899\"");
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
