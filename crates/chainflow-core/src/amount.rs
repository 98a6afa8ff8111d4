//! Balance-driven amount selection.
//!
//! Every trading module turns a task's [`AmountPolicy`] plus the wallet's
//! live balance into a concrete raw amount through [`select_amount`], so
//! all call sites agree on rounding (floor to whole raw units).

use rand::Rng;

use crate::decimal::{decimal_to_raw_ceil, decimal_to_raw_floor, raw_to_decimal};
use crate::error::{CoreError, CoreResult};
use crate::task::AmountPolicy;

/// Select the raw amount to move.
///
/// - `UseAllBalance`: the entire balance.
/// - `PercentOfBalance`: `floor(balance * p / 100)` for a uniform whole
///   percent `p` in `[min_percent, max_percent]`.
/// - `FixedRange`: uniform in `[min, min(max, balance)]`, in raw units.
///
/// Fails with `ZeroBalance` on an empty balance and `InsufficientBalance`
/// when the policy minimum exceeds the balance or a percentage floors to
/// zero. The selected amount is never zero.
pub fn select_amount<R: Rng>(
    policy: &AmountPolicy,
    balance_raw: u128,
    decimals: u8,
    rng: &mut R,
) -> CoreResult<u128> {
    if balance_raw == 0 {
        return Err(CoreError::ZeroBalance);
    }

    match policy {
        AmountPolicy::UseAllBalance => Ok(balance_raw),
        AmountPolicy::PercentOfBalance {
            min_percent,
            max_percent,
        } => {
            let percent = rng.gen_range(*min_percent..=*max_percent);
            match percent_of(balance_raw, percent) {
                0 => Err(insufficient(balance_raw, decimals, smallest_unit(decimals))),
                amount => Ok(amount),
            }
        }
        AmountPolicy::FixedRange { min, max } => {
            // Compared in raw units: large balances do not fit in a Decimal.
            let lo = decimal_to_raw_ceil(*min, decimals)?.max(1);
            if balance_raw < lo {
                return Err(insufficient(balance_raw, decimals, min.normalize().to_string()));
            }
            let max_raw = match decimal_to_raw_floor(*max, decimals) {
                Err(CoreError::AmountOverflow(_)) => u128::MAX,
                other => other?,
            };
            let hi = balance_raw.min(max_raw);

            if lo >= hi {
                // Range narrower than one raw unit.
                return Ok(lo);
            }
            Ok(rng.gen_range(lo..=hi))
        }
    }
}

fn insufficient(balance_raw: u128, decimals: u8, required: String) -> CoreError {
    let balance = match raw_to_decimal(balance_raw, decimals) {
        Ok(balance) => balance.normalize().to_string(),
        Err(_) => format!("{balance_raw} raw"),
    };
    CoreError::InsufficientBalance { balance, required }
}

fn smallest_unit(decimals: u8) -> String {
    match raw_to_decimal(1, decimals) {
        Ok(unit) => unit.to_string(),
        Err(_) => "1 raw".to_string(),
    }
}

/// `floor(value * percent / 100)` without intermediate overflow.
fn percent_of(value: u128, percent: u32) -> u128 {
    let p = u128::from(percent);
    match value.checked_mul(p) {
        Some(product) => product / 100,
        None => (value / 100) * p + (value % 100) * p / 100,
    }
}
