//! ERC20 call encoding.

use std::str::FromStr;

use alloy::primitives::{Address, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

use chainflow_core::ChainCall;

use crate::error::{ChainError, ChainResult};

sol! {
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function decimals() external view returns (uint8);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

/// Parse a hex address.
pub fn parse_address(s: &str) -> ChainResult<Address> {
    Address::from_str(s).map_err(|e| ChainError::Decode(format!("invalid address {s}: {e}")))
}

/// Narrow a uint256 to u128.
pub fn u256_to_u128(value: U256) -> ChainResult<u128> {
    u128::try_from(value).map_err(|_| ChainError::Decode(format!("value {value} exceeds u128")))
}

/// `balanceOf(owner)` call on `token`.
pub fn balance_of_call(token: &str, owner: &str) -> ChainResult<ChainCall> {
    let data = IERC20::balanceOfCall {
        owner: parse_address(owner)?,
    }
    .abi_encode();
    Ok(ChainCall::new(token, data))
}

pub fn decode_balance_of(data: &[u8]) -> ChainResult<u128> {
    let ret = IERC20::balanceOfCall::abi_decode_returns(data, true)
        .map_err(|e| ChainError::Decode(format!("balanceOf: {e}")))?;
    u256_to_u128(ret._0)
}

/// `decimals()` call on `token`.
pub fn decimals_call(token: &str) -> ChainCall {
    ChainCall::new(token, IERC20::decimalsCall {}.abi_encode())
}

pub fn decode_decimals(data: &[u8]) -> ChainResult<u8> {
    IERC20::decimalsCall::abi_decode_returns(data, true)
        .map(|ret| ret._0)
        .map_err(|e| ChainError::Decode(format!("decimals: {e}")))
}

/// `approve(spender, amount)` call on `token`.
pub fn approve_call(token: &str, spender: &str, amount: u128) -> ChainResult<ChainCall> {
    let data = IERC20::approveCall {
        spender: parse_address(spender)?,
        amount: U256::from(amount),
    }
    .abi_encode();
    Ok(ChainCall::new(token, data))
}

/// `transfer(to, amount)` call on `token`.
pub fn transfer_call(token: &str, to: &str, amount: u128) -> ChainResult<ChainCall> {
    let data = IERC20::transferCall {
        to: parse_address(to)?,
        amount: U256::from(amount),
    }
    .abi_encode();
    Ok(ChainCall::new(token, data))
}
