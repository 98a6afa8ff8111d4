//! Raw/decimal token unit conversion.
//!
//! Token amounts live on chain as integer base units ("raw") and are shown
//! to humans as decimals: `raw = decimal * 10^decimals`. Conversions use
//! `rust_decimal` so that no floating-point rounding leaks into amounts.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};

/// Largest scale `Decimal` can represent.
pub const MAX_DECIMALS: u8 = 28;

fn scale_factor(decimals: u8) -> CoreResult<Decimal> {
    if decimals > MAX_DECIMALS {
        return Err(CoreError::UnsupportedDecimals(decimals));
    }
    let factor = 10i128.pow(u32::from(decimals));
    Decimal::try_from_i128_with_scale(factor, 0)
        .map_err(|e| CoreError::AmountOverflow(e.to_string()))
}

/// Convert raw base units to a decimal amount.
pub fn raw_to_decimal(raw: u128, decimals: u8) -> CoreResult<Decimal> {
    if decimals > MAX_DECIMALS {
        return Err(CoreError::UnsupportedDecimals(decimals));
    }
    let mantissa =
        i128::try_from(raw).map_err(|_| CoreError::AmountOverflow(format!("raw amount {raw}")))?;
    Decimal::try_from_i128_with_scale(mantissa, u32::from(decimals))
        .map_err(|_| CoreError::AmountOverflow(format!("raw amount {raw}")))
}

/// Convert a decimal amount to raw units, rounding down.
pub fn decimal_to_raw_floor(value: Decimal, decimals: u8) -> CoreResult<u128> {
    scaled(value, decimals, Decimal::floor)
}

/// Convert a decimal amount to raw units, rounding up.
pub fn decimal_to_raw_ceil(value: Decimal, decimals: u8) -> CoreResult<u128> {
    scaled(value, decimals, Decimal::ceil)
}

fn scaled(value: Decimal, decimals: u8, round: fn(&Decimal) -> Decimal) -> CoreResult<u128> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(CoreError::AmountOverflow(format!("negative amount {value}")));
    }
    let product = value
        .checked_mul(scale_factor(decimals)?)
        .ok_or_else(|| CoreError::AmountOverflow(format!("{value} * 10^{decimals}")))?;
    round(&product)
        .to_u128()
        .ok_or_else(|| CoreError::AmountOverflow(format!("{value} * 10^{decimals}")))
}

/// Token amount in raw units together with its decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenAmount {
    /// Integer base units.
    pub raw: u128,
    /// Token decimals.
    pub decimals: u8,
}

impl TokenAmount {
    #[inline]
    pub fn new(raw: u128, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    /// Build from a decimal amount, rounding down to whole raw units.
    pub fn from_decimal(value: Decimal, decimals: u8) -> CoreResult<Self> {
        Ok(Self::new(decimal_to_raw_floor(value, decimals)?, decimals))
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.raw == 0
    }

    /// Human-readable decimal value.
    pub fn to_decimal(&self) -> CoreResult<Decimal> {
        raw_to_decimal(self.raw, self.decimals)
    }

    /// Amount gained from `earlier` to `self`, or `None` if it did not grow.
    #[must_use]
    pub fn delta_since(&self, earlier: TokenAmount) -> Option<TokenAmount> {
        self.raw
            .checked_sub(earlier.raw)
            .filter(|d| *d > 0)
            .map(|d| TokenAmount::new(d, self.decimals))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_decimal() {
            Ok(d) => write!(f, "{}", d.normalize()),
            Err(_) => write!(f, "{} (raw, {} decimals)", self.raw, self.decimals),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_raw_to_decimal() {
        assert_eq!(raw_to_decimal(10_000_000, 6).unwrap(), dec!(10));
        assert_eq!(raw_to_decimal(1, 18).unwrap(), dec!(0.000000000000000001));
        assert_eq!(raw_to_decimal(0, 0).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_decimal_to_raw_rounding() {
        assert_eq!(decimal_to_raw_floor(dec!(1.2345679), 6).unwrap(), 1_234_567);
        assert_eq!(decimal_to_raw_ceil(dec!(1.2345671), 6).unwrap(), 1_234_568);
        assert_eq!(decimal_to_raw_floor(dec!(5), 18).unwrap(), 5 * 10u128.pow(18));
    }

    #[test]
    fn test_unsupported_decimals() {
        assert_eq!(
            raw_to_decimal(1, 30),
            Err(CoreError::UnsupportedDecimals(30))
        );
    }

    #[test]
    fn test_negative_amount_rejected() {
        assert!(decimal_to_raw_floor(dec!(-1), 6).is_err());
    }

    #[test]
    fn test_delta_since() {
        let before = TokenAmount::new(100, 6);
        let after = TokenAmount::new(150, 6);
        assert_eq!(after.delta_since(before), Some(TokenAmount::new(50, 6)));
        assert_eq!(before.delta_since(after), None);
        assert_eq!(before.delta_since(before), None);
    }

    #[test]
    fn test_display_normalizes() {
        assert_eq!(TokenAmount::new(1_500_000, 6).to_string(), "1.5");
    }
}
