//! Currency and price-amount validation shared by the API layer.
//!
//! Prices are `NUMERIC(19,4)` in the database; currencies come from a fixed
//! allowed set with a configurable default for blank submissions.

use rust_decimal::Decimal;
use thiserror::Error;

/// Currency codes accepted by the catalog.
pub const ALLOWED_CURRENCIES: &[&str] = &["EUR", "USD", "GBP"];

/// Maximum number of decimal places a price amount may carry.
pub const MAX_PRICE_SCALE: u32 = 4;

/// Maximum number of significant digits (integer + fractional) in an amount.
pub const MAX_PRICE_DIGITS: u32 = 19;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("Currency({0}) is not one of the permitted values: EUR, USD, GBP")]
    InvalidCurrency(String),
    #[error("Price cannot be negative")]
    NegativeAmount,
    #[error("Price cannot have more than {MAX_PRICE_SCALE} decimal places")]
    ExcessivePrecision,
    #[error("Price cannot have more than {MAX_PRICE_DIGITS} digits")]
    TooLarge,
}

/// Resolve a submitted currency code against the allowed set.
///
/// A missing or blank submission resolves to `default`; anything else must be
/// a member of [`ALLOWED_CURRENCIES`].
///
/// # Errors
///
/// Returns [`MoneyError::InvalidCurrency`] for codes outside the allowed set.
pub fn resolve_currency(submitted: Option<&str>, default: &str) -> Result<String, MoneyError> {
    match submitted {
        None => Ok(default.to_string()),
        Some(code) if code.trim().is_empty() => Ok(default.to_string()),
        Some(code) => {
            if ALLOWED_CURRENCIES.contains(&code) {
                Ok(code.to_string())
            } else {
                Err(MoneyError::InvalidCurrency(code.to_string()))
            }
        }
    }
}

/// Validate a price amount: non-negative, at most 4 decimal places, and
/// within the 19-digit column bound.
///
/// # Errors
///
/// Returns the matching [`MoneyError`] variant on violation.
pub fn validate_amount(amount: Decimal) -> Result<(), MoneyError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(MoneyError::NegativeAmount);
    }
    // Trailing zeros don't count against the scale ("10.1000" is fine).
    if amount.normalize().scale() > MAX_PRICE_SCALE {
        return Err(MoneyError::ExcessivePrecision);
    }
    // NUMERIC(19,4) leaves 15 integer digits.
    let integer_bound = Decimal::from(10_i64.pow(MAX_PRICE_DIGITS - MAX_PRICE_SCALE));
    if amount >= integer_bound {
        return Err(MoneyError::TooLarge);
    }
    Ok(())
}
