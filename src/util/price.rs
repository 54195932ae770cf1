//! Strict decimal price parsing.
//!
//! Route prices are declared as plain decimal strings (`"1.00"`, `"0.025"`, `"10"`).
//! Unlike a human-facing money parser, nothing is stripped or coerced: currency
//! symbols, separators, signs and whitespace are all rejected, so a typo in a route
//! declaration fails loudly instead of silently charging a different amount.

use regex::Regex;
use rust_decimal::Decimal;
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::LazyLock;

static PRICE_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?$").expect("valid price regex"));

/// A validated, non-negative decimal price.
///
/// The original string is kept alongside the parsed value so the requirement
/// advertises exactly what the route declared (`"1.00"` stays `"1.00"`).
#[derive(Debug, Clone, PartialEq)]
pub struct Price {
    literal: String,
    value: Decimal,
}

/// Errors that can occur when parsing a price.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PriceParseError {
    /// The input is not a plain non-negative decimal number.
    #[error("Invalid price format: expected a non-negative decimal like \"1.00\"")]
    InvalidFormat,
    /// The value does not fit into a 96-bit decimal.
    #[error("Price is out of range, must not exceed {}", constants::MAX_STR)]
    OutOfRange,
}

mod constants {
    use super::*;

    pub const MAX_STR: &str = "999999999";

    pub static MAX: LazyLock<Decimal> =
        LazyLock::new(|| Decimal::from_str(MAX_STR).expect("valid decimal"));
}

impl Price {
    /// Parses a price, rejecting anything that is not a plain decimal literal.
    pub fn parse(input: &str) -> Result<Self, PriceParseError> {
        if !PRICE_FORMAT.is_match(input) {
            return Err(PriceParseError::InvalidFormat);
        }
        let value = Decimal::from_str(input).map_err(|_| PriceParseError::OutOfRange)?;
        if value > *constants::MAX {
            return Err(PriceParseError::OutOfRange);
        }
        Ok(Self {
            literal: input.to_string(),
            value,
        })
    }

    /// The price exactly as it was declared.
    pub fn as_str(&self) -> &str {
        &self.literal
    }

    /// The parsed decimal value.
    pub fn value(&self) -> Decimal {
        self.value
    }
}

impl FromStr for Price {
    type Err = PriceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Price::parse(s)
    }
}

impl Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal)
    }
}
