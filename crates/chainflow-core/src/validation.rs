//! Submission-time task validation.
//!
//! Input errors are rejected before a task enters the scheduler and are
//! never retried.

use rust_decimal::Decimal;

use crate::decimal::MAX_DECIMALS;
use crate::error::{CoreError, CoreResult};
use crate::task::{AmountPolicy, TaskConfig};
use crate::wallet::Wallet;

fn invalid(msg: impl Into<String>) -> CoreError {
    CoreError::InvalidTask(msg.into())
}

/// Validate a task configuration on its own.
pub fn validate_task_config(config: &TaskConfig) -> CoreResult<()> {
    match &config.amount {
        AmountPolicy::UseAllBalance => {}
        AmountPolicy::PercentOfBalance {
            min_percent,
            max_percent,
        } => {
            if *min_percent == 0 || *max_percent > 100 {
                return Err(invalid(format!(
                    "percent range [{min_percent}, {max_percent}] must lie within 1..=100"
                )));
            }
            if min_percent > max_percent {
                return Err(invalid(format!(
                    "percent range inverted: {min_percent} > {max_percent}"
                )));
            }
        }
        AmountPolicy::FixedRange { min, max } => {
            if min.is_sign_negative() || max.is_sign_negative() {
                return Err(invalid("amount range must not be negative"));
            }
            if max.is_zero() {
                return Err(invalid("amount range maximum must be positive"));
            }
            if min > max {
                return Err(invalid(format!("amount range inverted: {min} > {max}")));
            }
        }
    }

    if config.slippage_percent.is_sign_negative() || config.slippage_percent >= Decimal::ONE_HUNDRED
    {
        return Err(invalid(format!(
            "slippage {}% must lie within [0, 100)",
            config.slippage_percent
        )));
    }

    if config.min_delay_secs > config.max_delay_secs {
        return Err(invalid(format!(
            "delay range inverted: {} > {}",
            config.min_delay_secs, config.max_delay_secs
        )));
    }

    if let Some(reverse) = &config.reverse {
        if reverse.min_delay_secs > reverse.max_delay_secs {
            return Err(invalid(format!(
                "reverse delay range inverted: {} > {}",
                reverse.min_delay_secs, reverse.max_delay_secs
            )));
        }
    }

    for asset in std::iter::once(&config.coin_in).chain(config.coin_out.iter()) {
        if let Some(decimals) = asset.decimals {
            if decimals > MAX_DECIMALS {
                return Err(CoreError::UnsupportedDecimals(decimals));
            }
        }
    }

    if config.kind.is_two_sided() {
        let coin_out = config
            .coin_out
            .as_ref()
            .ok_or_else(|| invalid(format!("{} requires coin_out", config.kind)))?;
        if config.coin_in.same_coin(coin_out) {
            return Err(invalid(format!(
                "same coin on both sides: {}",
                config.coin_in
            )));
        }
    }

    Ok(())
}

/// Validate that a wallet can run a task.
pub fn validate_task_for_wallet(config: &TaskConfig, wallet: &Wallet) -> CoreResult<()> {
    if config.kind.requires_pair_address() && wallet.pair_address().is_none() {
        return Err(CoreError::InvalidWallet(format!(
            "{} requires a pair address for wallet {}",
            config.kind,
            wallet.id()
        )));
    }
    Ok(())
}
