//! Parsing of payment amounts into smallest currency units.
//!
//! Amounts on the wire are always integers in the chain's smallest unit (wei
//! for ether-like currencies). [`parse_units`] accepts a human decimal amount
//! such as `"1.5"` and scales it by `10^decimals`.

use std::str::FromStr;

use alloy_primitives::U256;
use rust_decimal::Decimal;

/// Decimals of the native currency on EVM chains.
pub const NATIVE_DECIMALS: u8 = 18;

/// Errors returned when an amount cannot be parsed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AmountError {
    /// The input was empty or whitespace.
    #[error("amount is empty")]
    Empty,
    /// The input is not a number of the expected shape.
    #[error("invalid amount: {0:?}")]
    Malformed(String),
    /// Negative amounts are never valid.
    #[error("amount must not be negative")]
    Negative,
    /// More fractional digits than the currency supports.
    #[error("amount has more than {decimals} fractional digits")]
    TooPrecise {
        /// Decimals of the currency.
        decimals: u8,
    },
    /// The scaled amount does not fit in 256 bits.
    #[error("amount overflows uint256")]
    Overflow,
}

/// Parses a non-negative integer amount given in smallest units.
///
/// # Errors
///
/// Returns [`AmountError`] for empty input, signs, decimal points or overflow.
pub fn parse_amount(input: &str) -> Result<U256, AmountError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(AmountError::Empty);
    }
    if s.starts_with('-') {
        return Err(AmountError::Negative);
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AmountError::Malformed(s.to_owned()));
    }
    U256::from_str_radix(s, 10).map_err(|_| AmountError::Overflow)
}

/// Parses a human decimal amount and scales it to smallest units.
///
/// `parse_units("1.5", 18)` yields `1_500_000_000_000_000_000`.
///
/// # Errors
///
/// Returns [`AmountError`] for malformed or negative input, or when the amount
/// has more fractional digits than `decimals`.
pub fn parse_units(input: &str, decimals: u8) -> Result<U256, AmountError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(AmountError::Empty);
    }
    let value = Decimal::from_str(s).map_err(|_| AmountError::Malformed(s.to_owned()))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AmountError::Negative);
    }
    let value = value.normalize();
    let scale = value.scale();
    if scale > u32::from(decimals) {
        return Err(AmountError::TooPrecise { decimals });
    }
    let mantissa = u128::try_from(value.mantissa()).map_err(|_| AmountError::Negative)?;
    let factor = U256::from(10_u8).pow(U256::from(u32::from(decimals) - scale));
    U256::from(mantissa)
        .checked_mul(factor)
        .ok_or(AmountError::Overflow)
}
