//! V2 router liquidity.
//!
//! Adding liquidity deposits `coin_in` under the task's amount policy plus
//! the matching amount of `coin_out` at the pool ratio, and snapshots the LP
//! balance first. Removing liquidity is its reverse: it burns exactly the LP
//! tokens minted since that snapshot. As a forward task, removal burns LP
//! tokens under the amount policy.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use tracing::debug;

use chainflow_chain::BoxFuture;
use chainflow_core::{Asset, ChainCall, FailureKind, TokenAmount, TransactionPayloadData};
use chainflow_executor::{LedgerEntry, ModuleContext, ModuleContract, ModuleError, ModuleResult};

use crate::router::{apply_slippage, mul_div, recipient, IUniswapV2Router02, Pool, V2Router};

/// Ledger key of the LP balance before adding liquidity.
pub const BALANCE_LP: &str = "balance_lp";

fn pair_assets(ctx: &ModuleContext) -> ModuleResult<(Asset, Asset)> {
    let config = ctx.task.config();
    let b = config.coin_out.clone().ok_or_else(|| {
        ModuleError::new(FailureKind::UnsupportedWallet, "liquidity without coin_out")
    })?;
    Ok((config.coin_in.clone(), b))
}

fn require_reserves(pool: &Pool) -> ModuleResult<()> {
    if pool.reserve_a == 0 || pool.reserve_b == 0 {
        return Err(ModuleError::new(
            FailureKind::QuoteFailed,
            format!("pool {} has no reserves", pool.pair),
        ));
    }
    Ok(())
}

fn math_error(e: chainflow_chain::ChainError) -> ModuleError {
    ModuleError::chain(FailureKind::QuoteFailed, e)
}

/// Desired deposit amounts at the pool ratio, limited by the `b` balance.
fn deposit_amounts(pool: &Pool, amount_a: u128, balance_b: u128) -> ModuleResult<(u128, u128)> {
    let mut a = amount_a;
    let mut b = mul_div(a, pool.reserve_b, pool.reserve_a).map_err(math_error)?;
    if b > balance_b {
        b = balance_b;
        a = mul_div(b, pool.reserve_a, pool.reserve_b).map_err(math_error)?;
    }
    if a == 0 || b == 0 {
        return Err(ModuleError::new(
            FailureKind::InsufficientBalance,
            "deposit rounds to zero at the pool ratio",
        ));
    }
    Ok((a, b))
}

/// Deposit `coin_in` and `coin_out` into their V2 pool.
pub struct AddLiquidityModule {
    router: Arc<V2Router>,
}

impl AddLiquidityModule {
    pub fn new(router: Arc<V2Router>) -> Self {
        Self { router }
    }
}

impl ModuleContract for AddLiquidityModule {
    fn snapshot<'a>(&'a self, ctx: &'a ModuleContext) -> BoxFuture<'a, ModuleResult<Option<LedgerEntry>>> {
        Box::pin(async move {
            let (a, b) = pair_assets(ctx)?;
            let pool = self.router.pool(ctx, &a, &b).await?;
            let balance = ctx.balance(&pool.lp_asset()).await?;
            Ok(Some(LedgerEntry::new().with_raw(BALANCE_LP, balance)))
        })
    }

    fn build_payload<'a>(
        &'a self,
        ctx: &'a ModuleContext,
    ) -> BoxFuture<'a, ModuleResult<TransactionPayloadData>> {
        Box::pin(async move {
            let (a, b) = pair_assets(ctx)?;
            let pool = self.router.pool(ctx, &a, &b).await?;
            require_reserves(&pool)?;

            let selected = ctx.select_amount(&a).await?;
            let balance_b = ctx.balance(&b).await?;
            let (amount_a, amount_b) = deposit_amounts(&pool, selected.raw, balance_b)?;

            let slippage = ctx.task.config().slippage_percent;
            let (min_a, min_b) = (apply_slippage(amount_a, slippage), apply_slippage(amount_b, slippage));
            let to = recipient(ctx)?;
            let deadline = self.router.deadline();
            let spender = self.router.address().to_string();
            debug!(
                wallet = %ctx.wallet.id(),
                amount_a,
                amount_b,
                pair = %pool.pair,
                "Liquidity deposit sized"
            );

            let mut calls: Vec<ChainCall> = Vec::with_capacity(3);
            calls.extend(ctx.approve_call(&a, &spender, amount_a)?);
            calls.extend(ctx.approve_call(&b, &spender, amount_b)?);

            // One native side at most: validation rejects identical coins.
            let call = match (a.is_native(), b.is_native()) {
                (true, _) => {
                    let token = self.router.token_address(&b)?;
                    self.router
                        .router_call(add_eth(token, amount_b, min_b, min_a, to, deadline))
                        .with_value(amount_a)
                }
                (_, true) => {
                    let token = self.router.token_address(&a)?;
                    self.router
                        .router_call(add_eth(token, amount_a, min_a, min_b, to, deadline))
                        .with_value(amount_b)
                }
                _ => self.router.router_call(
                    IUniswapV2Router02::addLiquidityCall {
                        tokenA: self.router.token_address(&a)?,
                        tokenB: self.router.token_address(&b)?,
                        amountADesired: U256::from(amount_a),
                        amountBDesired: U256::from(amount_b),
                        amountAMin: U256::from(min_a),
                        amountBMin: U256::from(min_b),
                        to,
                        deadline,
                    }
                    .abi_encode(),
                ),
            };
            calls.push(call);

            let decimals_a = ctx.decimals(&a).await?;
            let amount_in = TokenAmount::new(amount_a, decimals_a).to_decimal()?;
            let description = format!("{} add liquidity {}/{}", self.router.protocol(), a, b);
            Ok(TransactionPayloadData::new(calls, amount_in, description))
        })
    }
}

fn add_eth(
    token: Address,
    amount_token: u128,
    min_token: u128,
    min_eth: u128,
    to: Address,
    deadline: U256,
) -> Vec<u8> {
    IUniswapV2Router02::addLiquidityETHCall {
        token,
        amountTokenDesired: U256::from(amount_token),
        amountTokenMin: U256::from(min_token),
        amountETHMin: U256::from(min_eth),
        to,
        deadline,
    }
    .abi_encode()
}

/// Burn LP tokens of the `coin_in`/`coin_out` pool.
pub struct RemoveLiquidityModule {
    router: Arc<V2Router>,
}

impl RemoveLiquidityModule {
    pub fn new(router: Arc<V2Router>) -> Self {
        Self { router }
    }
}

impl ModuleContract for RemoveLiquidityModule {
    fn build_payload<'a>(
        &'a self,
        ctx: &'a ModuleContext,
    ) -> BoxFuture<'a, ModuleResult<TransactionPayloadData>> {
        Box::pin(async move {
            let (a, b) = pair_assets(ctx)?;
            let pool = self.router.pool(ctx, &a, &b).await?;
            let lp = pool.lp_asset();

            let liquidity = if ctx.task.is_virtual() {
                ctx.reverse_amount(&lp, BALANCE_LP).await?
            } else {
                ctx.select_amount(&lp).await?
            };

            let supply = self.router.total_supply(ctx, pool.pair).await?;
            let out_a = mul_div(liquidity.raw, pool.reserve_a, supply).map_err(math_error)?;
            let out_b = mul_div(liquidity.raw, pool.reserve_b, supply).map_err(math_error)?;
            let slippage = ctx.task.config().slippage_percent;
            let (min_a, min_b) = (apply_slippage(out_a, slippage), apply_slippage(out_b, slippage));
            let to = recipient(ctx)?;
            let deadline = self.router.deadline();

            let mut calls: Vec<ChainCall> = Vec::with_capacity(2);
            calls.extend(ctx.approve_call(&lp, &self.router.address().to_string(), liquidity.raw)?);

            let remove_eth = |token: Address, min_token: u128, min_eth: u128| {
                IUniswapV2Router02::removeLiquidityETHCall {
                    token,
                    liquidity: U256::from(liquidity.raw),
                    amountTokenMin: U256::from(min_token),
                    amountETHMin: U256::from(min_eth),
                    to,
                    deadline,
                }
                .abi_encode()
            };
            let data = match (a.is_native(), b.is_native()) {
                (true, _) => remove_eth(self.router.token_address(&b)?, min_b, min_a),
                (_, true) => remove_eth(self.router.token_address(&a)?, min_a, min_b),
                _ => IUniswapV2Router02::removeLiquidityCall {
                    tokenA: self.router.token_address(&a)?,
                    tokenB: self.router.token_address(&b)?,
                    liquidity: U256::from(liquidity.raw),
                    amountAMin: U256::from(min_a),
                    amountBMin: U256::from(min_b),
                    to,
                    deadline,
                }
                .abi_encode(),
            };
            calls.push(self.router.router_call(data));

            let description = format!("{} remove liquidity {}/{}", self.router.protocol(), a, b);
            Ok(TransactionPayloadData::new(calls, liquidity.to_decimal()?, description))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeRouter, OWNER, PAIR};
    use chainflow_chain::MockChainClient;
    use chainflow_core::{AmountPolicy, ModuleKey, OperationKind, Task, TaskConfig};

    fn add_task(a: Asset, b: Asset) -> Arc<Task> {
        Arc::new(Task::new(
            TaskConfig::new("v2", OperationKind::AddLiquidity, a, AmountPolicy::UseAllBalance)
                .with_coin_out(b),
        ))
    }

    fn lp() -> Asset {
        Asset::token("LP", PAIR, 18)
    }

    #[test]
    fn test_deposit_amounts_follow_pool_ratio() {
        let pool = Pool {
            pair: Address::ZERO,
            reserve_a: 1_000,
            reserve_b: 2_000,
        };
        assert_eq!(deposit_amounts(&pool, 100, 1_000).unwrap(), (100, 200));
        // Limited by b
        assert_eq!(deposit_amounts(&pool, 100, 50).unwrap(), (25, 50));
        assert_eq!(
            deposit_amounts(&pool, 100, 0).unwrap_err().kind,
            FailureKind::InsufficientBalance
        );
    }

    #[tokio::test]
    async fn test_add_liquidity_tokens() {
        let chain = Arc::new(MockChainClient::new());
        chain.set_balance(OWNER, &testing::usdc(), 10_000);
        chain.set_balance(OWNER, &testing::weth(), 50_000);
        FakeRouter::new(1).install(&chain);
        let ctx = testing::context(add_task(testing::usdc(), testing::weth()), chain);

        let payload = AddLiquidityModule::new(testing::router())
            .build_payload(&ctx)
            .await
            .unwrap();

        assert_eq!(payload.calls.len(), 3);
        let add = IUniswapV2Router02::addLiquidityCall::abi_decode(&payload.calls[2].data, true)
            .unwrap();
        assert_eq!(add.amountADesired, U256::from(10_000u64));
        assert_eq!(add.amountBDesired, U256::from(20_000u64));
        assert_eq!(add.amountAMin, U256::from(9_900u64));
        assert_eq!(add.amountBMin, U256::from(19_800u64));
    }

    #[tokio::test]
    async fn test_add_liquidity_with_native_side() {
        let chain = Arc::new(MockChainClient::new());
        chain.set_balance(OWNER, &testing::usdc(), 10_000);
        chain.set_balance(OWNER, &testing::eth(), 5_000);
        FakeRouter::new(1).install(&chain);
        let ctx = testing::context(add_task(testing::usdc(), testing::eth()), chain);

        let payload = AddLiquidityModule::new(testing::router())
            .build_payload(&ctx)
            .await
            .unwrap();

        // Native side limits the deposit: 5_000 ETH pairs with 2_500 USDC.
        assert_eq!(payload.calls.len(), 2);
        assert_eq!(payload.calls[1].value, 5_000);
        let add = IUniswapV2Router02::addLiquidityETHCall::abi_decode(&payload.calls[1].data, true)
            .unwrap();
        assert_eq!(add.amountTokenDesired, U256::from(2_500u64));
    }

    #[tokio::test]
    async fn test_snapshot_records_lp_balance() {
        let chain = Arc::new(MockChainClient::new());
        chain.set_balance(OWNER, &lp(), 1_000);
        FakeRouter::new(1).install(&chain);
        let ctx = testing::context(add_task(testing::usdc(), testing::weth()), chain);

        let entry = AddLiquidityModule::new(testing::router())
            .snapshot(&ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.raw(BALANCE_LP), Some(1_000));
    }

    #[tokio::test]
    async fn test_remove_burns_minted_lp() {
        let chain = Arc::new(MockChainClient::new());
        chain.set_balance(OWNER, &lp(), 3_000);
        FakeRouter::new(1).install(&chain);

        let forward = add_task(testing::usdc(), testing::weth());
        let reverse = ModuleKey::new("v2", OperationKind::RemoveLiquidity);
        let ctx = testing::context(Arc::new(forward.spawn_virtual(&reverse)), chain);
        ctx.ledger.record(
            ctx.wallet.id(),
            forward.id(),
            LedgerEntry::new().with_raw(BALANCE_LP, 1_000),
        );

        let payload = RemoveLiquidityModule::new(testing::router())
            .build_payload(&ctx)
            .await
            .unwrap();

        assert_eq!(payload.calls.len(), 2);
        assert!(payload.calls[0].to.eq_ignore_ascii_case(PAIR));
        let remove =
            IUniswapV2Router02::removeLiquidityCall::abi_decode(&payload.calls[1].data, true)
                .unwrap();
        assert_eq!(remove.liquidity, U256::from(2_000u64));
        // 2_000 / 100_000 of reserves 1_000_000 and 2_000_000, less 1%
        assert_eq!(remove.amountAMin, U256::from(19_800u64));
        assert_eq!(remove.amountBMin, U256::from(39_600u64));
    }

    #[tokio::test]
    async fn test_remove_without_new_lp_fails() {
        let chain = Arc::new(MockChainClient::new());
        chain.set_balance(OWNER, &lp(), 1_000);
        FakeRouter::new(1).install(&chain);

        let forward = add_task(testing::usdc(), testing::weth());
        let reverse = ModuleKey::new("v2", OperationKind::RemoveLiquidity);
        let ctx = testing::context(Arc::new(forward.spawn_virtual(&reverse)), chain);
        ctx.ledger.record(
            ctx.wallet.id(),
            forward.id(),
            LedgerEntry::new().with_raw(BALANCE_LP, 1_000),
        );

        let err = RemoveLiquidityModule::new(testing::router())
            .build_payload(&ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::NoReverseDelta);
    }
}
