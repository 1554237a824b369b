use std::fmt;

use serde::{Deserialize, Serialize};

/// Money is represented as integer minor units (cents, kopecks) to avoid
/// floating-point precision issues. For RUB/EUR/USD, 1 unit = 100 minor units.
pub type MinorUnits = i64;

/// An amount paired with the currency it is expressed in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub amount: MinorUnits,
    pub currency: String,
}

impl Money {
    pub fn new(amount: MinorUnits, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", format_minor(self.amount), self.currency)
    }
}

/// Format minor units as a human-readable decimal string.
/// Example: 5000 -> "50.00", -1234 -> "-12.34"
pub fn format_minor(amount: MinorUnits) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Parse a decimal string into minor units.
/// Example: "50.00" -> 5000, "12.5" -> 1250, "100" -> 10000
pub fn parse_minor(input: &str) -> Result<MinorUnits, ParseMoneyError> {
    let input = input.trim();
    let negative = input.starts_with('-');
    let input = input.trim_start_matches('-');

    let (units_str, fraction_str) = match input.split_once('.') {
        Some((units, fraction)) => (units, fraction),
        None => (input, ""),
    };
    if !fraction_str.bytes().all(|b| b.is_ascii_digit())
        || (units_str.is_empty() && fraction_str.is_empty())
    {
        return Err(ParseMoneyError::InvalidFormat);
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str
            .parse()
            .map_err(|_| ParseMoneyError::InvalidFormat)?
    };

    // Pad or truncate the fractional part to exactly two digits.
    let fraction: i64 = match fraction_str.len() {
        0 => 0,
        1 => i64::from(fraction_str.as_bytes()[0] - b'0') * 10,
        _ => {
            let digits = fraction_str.as_bytes();
            i64::from(digits[0] - b'0') * 10 + i64::from(digits[1] - b'0')
        }
    };

    let amount = units
        .checked_mul(100)
        .and_then(|minor| minor.checked_add(fraction))
        .ok_or(ParseMoneyError::Overflow)?;
    Ok(if negative { -amount } else { amount })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseMoneyError {
    InvalidFormat,
    Overflow,
}

impl fmt::Display for ParseMoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseMoneyError::InvalidFormat => write!(f, "invalid money format"),
            ParseMoneyError::Overflow => write!(f, "amount is too large"),
        }
    }
}

impl std::error::Error for ParseMoneyError {}
