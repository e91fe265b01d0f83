use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::domain::Error;

/// A strictly positive monetary amount, rounded to [`Money::TARGET_DECIMALS`]
/// places with banker's rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Money(Decimal);

impl Money {
    pub const TARGET_DECIMALS: u32 = 4;

    pub fn new(value: Decimal) -> Result<Self, Error> {
        let rounded = round(value);
        if rounded <= Decimal::ZERO {
            return Err(Error::InvalidAmount(value.to_string()));
        }
        Ok(Self(rounded))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn from_decimal_str(s: &str) -> Result<Self, Error> {
        Self::new(parse_decimal(s)?)
    }

    /// Parses an opening balance: zero is allowed, negatives are not.
    pub fn balance_from_str(s: &str) -> Result<Decimal, Error> {
        let value = round(parse_decimal(s)?);
        if value < Decimal::ZERO {
            return Err(Error::InvalidAmount(s.trim().to_string()));
        }
        Ok(value)
    }

    /// Accepts a JSON number or a numeric string.
    pub fn parse_json(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Number(n) => Self::from_decimal_str(&n.to_string()),
            Value::String(s) => Self::from_decimal_str(s),
            other => Err(Error::InvalidAmount(other.to_string())),
        }
    }
}

fn round(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(Money::TARGET_DECIMALS, RoundingStrategy::MidpointNearestEven)
}

fn parse_decimal(s: &str) -> Result<Decimal, Error> {
    let s = s.trim();
    // rust_decimal accepts digit separators; amounts are plain numerals.
    if s.is_empty() || s.contains('_') {
        return Err(Error::InvalidAmount(s.to_string()));
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .map_err(|_| Error::InvalidAmount(s.to_string()))
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Money::from_decimal_str(&s)
            .map_err(|_| serde::de::Error::custom(format!("Invalid Money format: {}", s)))
    }
}
