//! Uniswap V2 style router access.
//!
//! Call encoding for the router, factory and pair contracts, plus the
//! read-only queries modules need before building a payload: quotes,
//! pair lookup, reserves and LP supply.

use alloy::primitives::{Address, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use chainflow_chain::abi::{parse_address, u256_to_u128};
use chainflow_chain::{ChainError, ChainResult};
use chainflow_core::{Asset, ChainCall, FailureKind};
use chainflow_executor::{ModuleContext, ModuleError, ModuleResult};

use crate::config::V2RouterConfig;

sol! {
    interface IUniswapV2Router02 {
        function getAmountsOut(uint256 amountIn, address[] calldata path) external view returns (uint256[] memory amounts);
        function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external returns (uint256[] memory amounts);
        function swapExactETHForTokens(uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external payable returns (uint256[] memory amounts);
        function swapExactTokensForETH(uint256 amountIn, uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external returns (uint256[] memory amounts);
        function addLiquidity(address tokenA, address tokenB, uint256 amountADesired, uint256 amountBDesired, uint256 amountAMin, uint256 amountBMin, address to, uint256 deadline) external returns (uint256 amountA, uint256 amountB, uint256 liquidity);
        function addLiquidityETH(address token, uint256 amountTokenDesired, uint256 amountTokenMin, uint256 amountETHMin, address to, uint256 deadline) external payable returns (uint256 amountToken, uint256 amountETH, uint256 liquidity);
        function removeLiquidity(address tokenA, address tokenB, uint256 liquidity, uint256 amountAMin, uint256 amountBMin, address to, uint256 deadline) external returns (uint256 amountA, uint256 amountB);
        function removeLiquidityETH(address token, uint256 liquidity, uint256 amountTokenMin, uint256 amountETHMin, address to, uint256 deadline) external returns (uint256 amountToken, uint256 amountETH);
    }

    interface IUniswapV2Factory {
        function getPair(address tokenA, address tokenB) external view returns (address pair);
    }

    // Reserves are uint112 on chain; each still occupies one word.
    interface IUniswapV2Pair {
        function token0() external view returns (address token);
        function getReserves() external view returns (uint256 reserve0, uint256 reserve1, uint256 blockTimestampLast);
        function totalSupply() external view returns (uint256 supply);
    }
}

/// LP tokens of V2 pairs always have 18 decimals.
pub const LP_DECIMALS: u8 = 18;

const BPS: u128 = 10_000;

/// `amount` reduced by `slippage_percent`, rounded down.
pub fn apply_slippage(amount: u128, slippage_percent: Decimal) -> u128 {
    let bps = (slippage_percent * Decimal::ONE_HUNDRED)
        .round()
        .to_u128()
        .unwrap_or(BPS)
        .min(BPS);
    let keep = BPS - bps;
    // Split to avoid overflow: floor((q*B + r) * k / B) = q*k + floor(r*k / B)
    (amount / BPS) * keep + (amount % BPS) * keep / BPS
}

/// `a * b / c` in 256-bit arithmetic.
pub fn mul_div(a: u128, b: u128, c: u128) -> ChainResult<u128> {
    if c == 0 {
        return Err(ChainError::Decode("division by zero reserve".to_string()));
    }
    u256_to_u128(U256::from(a) * U256::from(b) / U256::from(c))
}

fn config_error(e: ChainError) -> ModuleError {
    ModuleError::chain(FailureKind::UnsupportedWallet, e)
}

fn quote_error(e: ChainError) -> ModuleError {
    ModuleError::chain(FailureKind::QuoteFailed, e)
}

/// Liquidity pool of a coin pair, with reserves ordered as (a, b).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    pub pair: Address,
    pub reserve_a: u128,
    pub reserve_b: u128,
}

impl Pool {
    /// The pool's LP token as an asset.
    pub fn lp_asset(&self) -> Asset {
        Asset::token("LP", self.pair.to_string(), LP_DECIMALS)
    }
}

/// One configured V2 router deployment.
#[derive(Debug, Clone)]
pub struct V2Router {
    protocol: String,
    router: Address,
    factory: Address,
    wrapped_native: Address,
    deadline_secs: u64,
}

impl V2Router {
    /// Parse the configured addresses.
    pub fn new(config: &V2RouterConfig) -> ChainResult<Self> {
        Ok(Self {
            protocol: config.protocol.clone(),
            router: parse_address(&config.router)?,
            factory: parse_address(&config.factory)?,
            wrapped_native: parse_address(&config.wrapped_native)?,
            deadline_secs: config.deadline_secs,
        })
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn address(&self) -> Address {
        self.router
    }

    /// Token address used for `asset` in paths and pair lookups.
    pub fn token_address(&self, asset: &Asset) -> ModuleResult<Address> {
        match &asset.address {
            None => Ok(self.wrapped_native),
            Some(address) => parse_address(address).map_err(config_error),
        }
    }

    pub fn path(&self, from: &Asset, to: &Asset) -> ModuleResult<Vec<Address>> {
        Ok(vec![self.token_address(from)?, self.token_address(to)?])
    }

    /// Unix deadline for a transaction built now.
    pub fn deadline(&self) -> U256 {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        U256::from(now.saturating_add(self.deadline_secs))
    }

    fn call(&self, to: Address, data: Vec<u8>) -> ChainCall {
        ChainCall::new(to.to_string(), data)
    }

    async fn query(&self, ctx: &ModuleContext, call: ChainCall) -> ModuleResult<Vec<u8>> {
        ctx.chain.call(&call).await.map_err(quote_error)
    }

    /// Output amount of the last hop for `amount_in` along `path`.
    pub async fn quote(
        &self,
        ctx: &ModuleContext,
        amount_in: u128,
        path: &[Address],
    ) -> ModuleResult<u128> {
        let data = IUniswapV2Router02::getAmountsOutCall {
            amountIn: U256::from(amount_in),
            path: path.to_vec(),
        }
        .abi_encode();
        let ret = self.query(ctx, self.call(self.router, data)).await?;
        let amounts = IUniswapV2Router02::getAmountsOutCall::abi_decode_returns(&ret, true)
            .map_err(|e| quote_error(ChainError::Decode(format!("getAmountsOut: {e}"))))?
            .amounts;
        let out = amounts
            .last()
            .copied()
            .ok_or_else(|| ModuleError::new(FailureKind::QuoteFailed, "empty getAmountsOut result"))?;
        u256_to_u128(out).map_err(quote_error)
    }

    /// Pool for the (a, b) coin pair.
    ///
    /// Fails with `QuoteFailed` when the pair does not exist.
    pub async fn pool(&self, ctx: &ModuleContext, a: &Asset, b: &Asset) -> ModuleResult<Pool> {
        let token_a = self.token_address(a)?;
        let token_b = self.token_address(b)?;

        let data = IUniswapV2Factory::getPairCall {
            tokenA: token_a,
            tokenB: token_b,
        }
        .abi_encode();
        let ret = self.query(ctx, self.call(self.factory, data)).await?;
        let pair = IUniswapV2Factory::getPairCall::abi_decode_returns(&ret, true)
            .map_err(|e| quote_error(ChainError::Decode(format!("getPair: {e}"))))?
            .pair;
        if pair == Address::ZERO {
            return Err(ModuleError::new(
                FailureKind::QuoteFailed,
                format!("no {a}/{b} pair on {}", self.protocol),
            ));
        }

        let ret = self
            .query(ctx, self.call(pair, IUniswapV2Pair::token0Call {}.abi_encode()))
            .await?;
        let token0 = IUniswapV2Pair::token0Call::abi_decode_returns(&ret, true)
            .map_err(|e| quote_error(ChainError::Decode(format!("token0: {e}"))))?
            .token;

        let ret = self
            .query(ctx, self.call(pair, IUniswapV2Pair::getReservesCall {}.abi_encode()))
            .await?;
        let reserves = IUniswapV2Pair::getReservesCall::abi_decode_returns(&ret, true)
            .map_err(|e| quote_error(ChainError::Decode(format!("getReserves: {e}"))))?;
        let r0 = u256_to_u128(reserves.reserve0).map_err(quote_error)?;
        let r1 = u256_to_u128(reserves.reserve1).map_err(quote_error)?;

        let (reserve_a, reserve_b) = if token0 == token_a { (r0, r1) } else { (r1, r0) };
        Ok(Pool {
            pair,
            reserve_a,
            reserve_b,
        })
    }

    /// Total LP supply of `pair`.
    pub async fn total_supply(&self, ctx: &ModuleContext, pair: Address) -> ModuleResult<u128> {
        let ret = self
            .query(ctx, self.call(pair, IUniswapV2Pair::totalSupplyCall {}.abi_encode()))
            .await?;
        let supply = IUniswapV2Pair::totalSupplyCall::abi_decode_returns(&ret, true)
            .map_err(|e| quote_error(ChainError::Decode(format!("totalSupply: {e}"))))?
            .supply;
        u256_to_u128(supply).map_err(quote_error)
    }

    /// Router call with `data`.
    pub fn router_call(&self, data: Vec<u8>) -> ChainCall {
        self.call(self.router, data)
    }
}

/// Recipient of router outputs: the wallet itself.
pub fn recipient(ctx: &ModuleContext) -> ModuleResult<Address> {
    parse_address(ctx.wallet.address()).map_err(config_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_apply_slippage() {
        assert_eq!(apply_slippage(10_000, dec!(1)), 9_900);
        assert_eq!(apply_slippage(10_000, dec!(0.5)), 9_950);
        assert_eq!(apply_slippage(10_000, Decimal::ZERO), 10_000);
        assert_eq!(apply_slippage(999, dec!(1)), 989);
        // No overflow near u128::MAX
        assert_eq!(apply_slippage(u128::MAX, Decimal::ZERO), u128::MAX);
        assert!(apply_slippage(u128::MAX, dec!(50)) < u128::MAX / 2 + 1);
    }

    #[test]
    fn test_mul_div() {
        assert_eq!(mul_div(1_000, 3, 2).unwrap(), 1_500);
        assert_eq!(mul_div(u128::MAX, 2, 4).unwrap(), u128::MAX / 2);
        assert!(mul_div(1, 1, 0).is_err());
    }

    #[test]
    fn test_router_rejects_bad_address() {
        let config = V2RouterConfig {
            protocol: "v2".into(),
            router: "router".into(),
            factory: "0x00000000000000000000000000000000000000f1".into(),
            wrapped_native: "0x00000000000000000000000000000000000000ee".into(),
            deadline_secs: 60,
        };
        assert!(V2Router::new(&config).is_err());
    }
}
