//! V2 router swaps.
//!
//! The forward swap sells `coin_in` for `coin_out` and snapshots the
//! `coin_out` balance first. Its reverse sells back exactly the `coin_out`
//! gained since that snapshot.

use std::sync::Arc;

use alloy::primitives::U256;
use alloy::sol_types::SolCall;
use tracing::debug;

use chainflow_chain::BoxFuture;
use chainflow_core::{Asset, ChainCall, FailureKind, TokenAmount, TransactionPayloadData};
use chainflow_executor::{LedgerEntry, ModuleContext, ModuleContract, ModuleError, ModuleResult};

use crate::router::{apply_slippage, recipient, IUniswapV2Router02, V2Router};

/// Ledger key of the `coin_out` balance before the forward swap.
pub const BALANCE_OUT: &str = "balance_out";

fn coin_out(ctx: &ModuleContext) -> ModuleResult<Asset> {
    ctx.task.config().coin_out.clone().ok_or_else(|| {
        ModuleError::new(FailureKind::UnsupportedWallet, "swap without coin_out")
    })
}

/// Quote, approve and swap calls for selling `amount` of `from` for `to`.
async fn swap_payload(
    router: &V2Router,
    ctx: &ModuleContext,
    from: &Asset,
    to: &Asset,
    amount: TokenAmount,
    description: String,
) -> ModuleResult<TransactionPayloadData> {
    let path = router.path(from, to)?;
    let quote = router.quote(ctx, amount.raw, &path).await?;
    if quote == 0 {
        return Err(ModuleError::new(
            FailureKind::QuoteFailed,
            format!("zero quote for {amount} {from}"),
        ));
    }
    let min_out = apply_slippage(quote, ctx.task.config().slippage_percent);
    let recipient = recipient(ctx)?;
    let deadline = router.deadline();
    debug!(
        wallet = %ctx.wallet.id(),
        amount_in = amount.raw,
        quote,
        min_out,
        "Swap quoted"
    );

    let mut calls: Vec<ChainCall> = Vec::with_capacity(2);
    if from.is_native() {
        let data = IUniswapV2Router02::swapExactETHForTokensCall {
            amountOutMin: U256::from(min_out),
            path,
            to: recipient,
            deadline,
        }
        .abi_encode();
        calls.push(router.router_call(data).with_value(amount.raw));
    } else {
        calls.extend(ctx.approve_call(from, &router.address().to_string(), amount.raw)?);
        let data = if to.is_native() {
            IUniswapV2Router02::swapExactTokensForETHCall {
                amountIn: U256::from(amount.raw),
                amountOutMin: U256::from(min_out),
                path,
                to: recipient,
                deadline,
            }
            .abi_encode()
        } else {
            IUniswapV2Router02::swapExactTokensForTokensCall {
                amountIn: U256::from(amount.raw),
                amountOutMin: U256::from(min_out),
                path,
                to: recipient,
                deadline,
            }
            .abi_encode()
        };
        calls.push(router.router_call(data));
    }

    let out_decimals = ctx.decimals(to).await?;
    let amount_out = TokenAmount::new(quote, out_decimals).to_decimal()?;
    Ok(TransactionPayloadData::new(calls, amount.to_decimal()?, description).with_amount_out(amount_out))
}

/// Sell `coin_in` for `coin_out` under the task's amount policy.
pub struct SwapModule {
    router: Arc<V2Router>,
}

impl SwapModule {
    pub fn new(router: Arc<V2Router>) -> Self {
        Self { router }
    }
}

impl ModuleContract for SwapModule {
    fn snapshot<'a>(&'a self, ctx: &'a ModuleContext) -> BoxFuture<'a, ModuleResult<Option<LedgerEntry>>> {
        Box::pin(async move {
            let out = coin_out(ctx)?;
            let balance = ctx.balance(&out).await?;
            Ok(Some(LedgerEntry::new().with_raw(BALANCE_OUT, balance)))
        })
    }

    fn build_payload<'a>(
        &'a self,
        ctx: &'a ModuleContext,
    ) -> BoxFuture<'a, ModuleResult<TransactionPayloadData>> {
        Box::pin(async move {
            let config = ctx.task.config();
            let out = coin_out(ctx)?;
            let amount = ctx.select_amount(&config.coin_in).await?;
            let description = format!("{} swap {}->{}", self.router.protocol(), config.coin_in, out);
            swap_payload(&self.router, ctx, &config.coin_in, &out, amount, description).await
        })
    }
}

/// Sell back the `coin_out` gained by the forward swap.
pub struct ReverseSwapModule {
    router: Arc<V2Router>,
}

impl ReverseSwapModule {
    pub fn new(router: Arc<V2Router>) -> Self {
        Self { router }
    }
}

impl ModuleContract for ReverseSwapModule {
    fn build_payload<'a>(
        &'a self,
        ctx: &'a ModuleContext,
    ) -> BoxFuture<'a, ModuleResult<TransactionPayloadData>> {
        Box::pin(async move {
            let config = ctx.task.config();
            let out = coin_out(ctx)?;
            let amount = ctx.reverse_amount(&out, BALANCE_OUT).await?;
            let description = format!(
                "{} reverse swap {}->{}",
                self.router.protocol(),
                out,
                config.coin_in
            );
            swap_payload(&self.router, ctx, &out, &config.coin_in, amount, description).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeRouter, OWNER};
    use chainflow_chain::MockChainClient;
    use chainflow_core::{AmountPolicy, OperationKind, Task, TaskConfig};

    fn swap_task(from: Asset, to: Asset) -> Arc<Task> {
        Arc::new(Task::new(
            TaskConfig::new("v2", OperationKind::Swap, from, AmountPolicy::UseAllBalance)
                .with_coin_out(to),
        ))
    }

    #[tokio::test]
    async fn test_token_swap_quotes_approves_and_swaps() {
        let chain = Arc::new(MockChainClient::new());
        chain.set_balance(OWNER, &testing::usdc(), 1_000_000);
        FakeRouter::new(2).install(&chain);
        let ctx = testing::context(swap_task(testing::usdc(), testing::weth()), chain);

        let payload = SwapModule::new(testing::router())
            .build_payload(&ctx)
            .await
            .unwrap();

        assert_eq!(payload.calls.len(), 2);
        let approve = &payload.calls[0];
        assert_eq!(approve.to, testing::usdc().address.unwrap());

        let swap = IUniswapV2Router02::swapExactTokensForTokensCall::abi_decode(
            &payload.calls[1].data,
            true,
        )
        .unwrap();
        assert_eq!(swap.amountIn, U256::from(1_000_000u64));
        // Quote 2_000_000 less 1% slippage
        assert_eq!(swap.amountOutMin, U256::from(1_980_000u64));
        assert_eq!(swap.path.len(), 2);
    }

    #[tokio::test]
    async fn test_native_swap_sends_value_without_approve() {
        let chain = Arc::new(MockChainClient::new());
        chain.set_balance(OWNER, &testing::eth(), 5_000);
        FakeRouter::new(3).install(&chain);
        let ctx = testing::context(swap_task(testing::eth(), testing::usdc()), chain);

        let payload = SwapModule::new(testing::router())
            .build_payload(&ctx)
            .await
            .unwrap();

        assert_eq!(payload.calls.len(), 1);
        assert_eq!(payload.calls[0].value, 5_000);
        let swap =
            IUniswapV2Router02::swapExactETHForTokensCall::abi_decode(&payload.calls[0].data, true)
                .unwrap();
        assert_eq!(swap.path[0], testing::router().token_address(&testing::eth()).unwrap());
    }

    #[tokio::test]
    async fn test_quote_failure_is_retryable() {
        let chain = Arc::new(MockChainClient::new());
        chain.set_balance(OWNER, &testing::usdc(), 1_000_000);
        let ctx = testing::context(swap_task(testing::usdc(), testing::weth()), chain);

        // No call handler installed: every eth_call fails.
        let err = SwapModule::new(testing::router())
            .build_payload(&ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::QuoteFailed);
        assert!(err.kind.is_retryable());
    }

    #[tokio::test]
    async fn test_snapshot_records_coin_out_balance() {
        let chain = Arc::new(MockChainClient::new());
        chain.set_balance(OWNER, &testing::weth(), 4_200);
        let ctx = testing::context(swap_task(testing::usdc(), testing::weth()), chain);

        let entry = SwapModule::new(testing::router())
            .snapshot(&ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.raw(BALANCE_OUT), Some(4_200));
    }

    #[tokio::test]
    async fn test_reverse_sells_gained_amount() {
        let chain = Arc::new(MockChainClient::new());
        chain.set_balance(OWNER, &testing::weth(), 9_000);
        FakeRouter::new(1).install(&chain);

        let forward = swap_task(testing::usdc(), testing::weth());
        let reverse_key = chainflow_core::ModuleKey::new("v2", OperationKind::ReverseSwap);
        let virtual_task = Arc::new(forward.spawn_virtual(&reverse_key));
        let ctx = testing::context(virtual_task, chain);
        ctx.ledger.record(
            ctx.wallet.id(),
            forward.id(),
            LedgerEntry::new().with_raw(BALANCE_OUT, 4_000),
        );

        let payload = ReverseSwapModule::new(testing::router())
            .build_payload(&ctx)
            .await
            .unwrap();
        let swap = IUniswapV2Router02::swapExactTokensForTokensCall::abi_decode(
            &payload.calls[1].data,
            true,
        )
        .unwrap();
        assert_eq!(swap.amountIn, U256::from(5_000u64));
        assert_eq!(payload.calls[0].to, testing::weth().address.unwrap());
    }
}
