//! Module contract.
//!
//! Every protocol plug-in implements [`ModuleContract::build_payload`]. The
//! shared pipeline (sign, fee estimation, native balance check, broadcast,
//! receipt wait) and the retry loop are provided methods and are not meant
//! to be overridden per protocol.
//!
//! Failures never cross this boundary as errors: they are folded into a
//! [`ModuleExecutionResult`] whose retry flag follows the [`FailureKind`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chainflow_chain::{abi, BoxFuture, ChainError, DynChainClient};
use chainflow_core::{
    select_amount, Asset, ChainCall, CoreError, FailureKind, FeePolicy, ModuleExecutionResult,
    Task, TokenAmount, TransactionPayloadData, Wallet,
};
use chainflow_telemetry::Metrics;

use crate::ledger::{ExecutionLedger, LedgerEntry};
use crate::sleep::cancellable_sleep;

// ============================================================================
// ModuleError
// ============================================================================

/// Classified module failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleError {
    pub kind: FailureKind,
    pub message: String,
    /// Hash of a transaction that was already broadcast.
    pub hash: Option<String>,
}

impl ModuleError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            hash: None,
        }
    }

    /// Classify a chain error, keeping structural conditions structural.
    pub fn chain(default_kind: FailureKind, error: ChainError) -> Self {
        let kind = match &error {
            ChainError::AccountNotDeployed(_) => FailureKind::AccountNotDeployed,
            ChainError::InvalidProxy(_) => FailureKind::InvalidProxy,
            _ => default_kind,
        };
        Self::new(kind, error.to_string())
    }

    #[must_use]
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    /// Fold into a module result.
    pub fn into_result(self) -> ModuleExecutionResult {
        let result = ModuleExecutionResult::failure(self.kind, self.message);
        match self.hash {
            Some(hash) => result.with_hash(hash),
            None => result,
        }
    }
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ModuleError {}

impl From<CoreError> for ModuleError {
    fn from(e: CoreError) -> Self {
        let kind = match &e {
            CoreError::ZeroBalance => FailureKind::ZeroBalance,
            CoreError::InsufficientBalance { .. } => FailureKind::InsufficientBalance,
            CoreError::AmountOverflow(_) | CoreError::UnsupportedDecimals(_) => {
                FailureKind::InvalidAmount
            }
            CoreError::InvalidWallet(_)
            | CoreError::InvalidTask(_)
            | CoreError::InvalidConfig(_) => FailureKind::UnsupportedWallet,
        };
        Self::new(kind, e.to_string())
    }
}

pub type ModuleResult<T> = Result<T, ModuleError>;

// ============================================================================
// ModuleContext
// ============================================================================

/// Everything a module invocation may touch.
#[derive(Clone)]
pub struct ModuleContext {
    pub task: Arc<Task>,
    pub wallet: Arc<Wallet>,
    pub chain: DynChainClient,
    pub ledger: Arc<ExecutionLedger>,
    pub cancel: CancellationToken,
    /// Delay between attempts in `try_send`.
    pub retry_delay: Duration,
}

impl ModuleContext {
    /// Live balance of `asset` in the wallet.
    pub async fn balance(&self, asset: &Asset) -> ModuleResult<u128> {
        self.chain
            .get_balance(self.wallet.address(), asset)
            .await
            .map_err(|e| ModuleError::chain(FailureKind::Rpc, e))
    }

    /// Decimals of `asset`, preferring the configured value.
    pub async fn decimals(&self, asset: &Asset) -> ModuleResult<u8> {
        if let Some(decimals) = asset.decimals {
            return Ok(decimals);
        }
        self.chain
            .decimals(asset)
            .await
            .map_err(|e| ModuleError::chain(FailureKind::Rpc, e))
    }

    /// Live balance of `asset` with its decimals.
    pub async fn token_amount(&self, asset: &Asset) -> ModuleResult<TokenAmount> {
        let decimals = self.decimals(asset).await?;
        let raw = self.balance(asset).await?;
        Ok(TokenAmount::new(raw, decimals))
    }

    /// Amount of `asset` to move under the task's amount policy.
    ///
    /// Forward tasks only; virtual tasks use [`Self::reverse_amount`].
    pub async fn select_amount(&self, asset: &Asset) -> ModuleResult<TokenAmount> {
        let balance = self.token_amount(asset).await?;
        let raw = select_amount(
            &self.task.config().amount,
            balance.raw,
            balance.decimals,
            &mut rand::thread_rng(),
        )?;
        Ok(TokenAmount::new(raw, balance.decimals))
    }

    /// Ledger entry recorded by the forward task.
    pub fn ledger_entry(&self) -> ModuleResult<LedgerEntry> {
        self.ledger
            .get(self.wallet.id(), self.task.ledger_task_id())
            .ok_or_else(|| {
                ModuleError::new(
                    FailureKind::MissingLedgerEntry,
                    format!("no entry for {}", self.task.ledger_task_id()),
                )
            })
    }

    /// Balance of `asset` gained since the forward task ran.
    ///
    /// `key` names the pre-execution balance in the ledger entry. Fails with
    /// `NoReverseDelta` when nothing was gained.
    pub async fn reverse_amount(&self, asset: &Asset, key: &str) -> ModuleResult<TokenAmount> {
        let entry = self.ledger_entry()?;
        let before = entry.raw(key).ok_or_else(|| {
            ModuleError::new(FailureKind::MissingLedgerEntry, format!("no {key} recorded"))
        })?;
        let current = self.token_amount(asset).await?;
        let earlier = TokenAmount::new(before, current.decimals);
        current.delta_since(earlier).ok_or_else(|| {
            ModuleError::new(
                FailureKind::NoReverseDelta,
                format!("{} balance {} not above {}", asset.symbol, current, earlier),
            )
        })
    }

    /// `approve(spender, amount)` for token inputs; `None` for the native coin.
    pub fn approve_call(
        &self,
        asset: &Asset,
        spender: &str,
        amount: u128,
    ) -> ModuleResult<Option<ChainCall>> {
        match &asset.address {
            None => Ok(None),
            Some(token) => abi::approve_call(token, spender, amount)
                .map(Some)
                .map_err(|e| ModuleError::chain(FailureKind::UnsupportedWallet, e)),
        }
    }
}

// ============================================================================
// ModuleContract
// ============================================================================

/// Interface every protocol plug-in implements.
pub trait ModuleContract: Send + Sync {
    /// Balance lookups, quotes and call construction. Must not submit.
    fn build_payload<'a>(
        &'a self,
        ctx: &'a ModuleContext,
    ) -> BoxFuture<'a, ModuleResult<TransactionPayloadData>>;

    /// Values the reverse counterpart needs, captured before execution.
    fn snapshot<'a>(&'a self, _ctx: &'a ModuleContext) -> BoxFuture<'a, ModuleResult<Option<LedgerEntry>>> {
        Box::pin(async { Ok(None) })
    }

    /// Build, sign, estimate, check fees, submit and optionally await the receipt.
    fn execute<'a>(&'a self, ctx: &'a ModuleContext) -> BoxFuture<'a, ModuleExecutionResult> {
        Box::pin(async move {
            match run_pipeline(self, ctx).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(
                        wallet = %ctx.wallet.id(),
                        task_id = %ctx.task.id(),
                        kind = %e.kind,
                        error = %e.message,
                        "Module execution failed"
                    );
                    e.into_result()
                }
            }
        })
    }

    /// Call `execute` up to `retries` times (at least once).
    ///
    /// Stops on success, on a non-retryable failure, in test mode, or when
    /// the run is cancelled during the delay between attempts.
    fn try_send<'a>(&'a self, ctx: &'a ModuleContext, retries: u32) -> BoxFuture<'a, ModuleExecutionResult> {
        Box::pin(async move {
            let attempts = retries.max(1);
            let kind = ctx.task.config().kind.to_string();
            let test_mode = ctx.task.config().test_mode;
            let mut attempt = 1;
            loop {
                Metrics::task_attempt(&kind);
                let result = self.execute(ctx).await;
                if result.execution_status || !result.retry_needed || test_mode || attempt >= attempts
                {
                    return result;
                }
                info!(
                    wallet = %ctx.wallet.id(),
                    task_id = %ctx.task.id(),
                    attempt,
                    attempts,
                    info = %result.execution_info,
                    "Retrying task"
                );
                if !cancellable_sleep(&ctx.cancel, ctx.retry_delay).await {
                    return result;
                }
                attempt += 1;
            }
        })
    }
}

async fn run_pipeline<M: ModuleContract + ?Sized>(
    module: &M,
    ctx: &ModuleContext,
) -> ModuleResult<ModuleExecutionResult> {
    let config = ctx.task.config();
    let payload = module.build_payload(ctx).await?;
    debug!(
        wallet = %ctx.wallet.id(),
        task_id = %ctx.task.id(),
        calls = payload.calls.len(),
        amount_in = %payload.amount_in,
        "Payload built"
    );

    let signed = ctx
        .chain
        .sign(&ctx.wallet, &payload.calls)
        .await
        .map_err(|e| ModuleError::chain(FailureKind::SigningFailed, e))?;

    let fee = match config.fee {
        FeePolicy::Auto => ctx
            .chain
            .estimate_fee(&signed)
            .await
            .map_err(|e| ModuleError::chain(FailureKind::FeeEstimationFailed, e))?,
        FeePolicy::ForcedMax { max_fee_wei } => max_fee_wei,
    };

    if config.test_mode {
        info!(
            wallet = %ctx.wallet.id(),
            task_id = %ctx.task.id(),
            fee_wei = fee,
            "Test mode: transaction not broadcast"
        );
        return Ok(ModuleExecutionResult::simulated(format!(
            "simulated {} (fee {fee} wei)",
            payload.description
        )));
    }

    let value: u128 = payload.calls.iter().map(|c| c.value).sum();
    let required = fee.saturating_add(value);
    let native = ctx.balance(&Asset::native("native", 18)).await?;
    if native < required {
        return Err(ModuleError::new(
            FailureKind::InsufficientNativeBalance,
            format!("have {native} wei, need {required} wei"),
        ));
    }

    let hash = ctx
        .chain
        .submit(&signed)
        .await
        .map_err(|e| ModuleError::chain(FailureKind::BroadcastFailed, e))?;
    info!(
        wallet = %ctx.wallet.id(),
        task_id = %ctx.task.id(),
        tx_hash = %hash,
        "Transaction submitted"
    );

    if config.wait_for_receipt {
        let timeout = Duration::from_secs(config.receipt_timeout_secs);
        let receipt = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                return Err(ModuleError::new(FailureKind::Cancelled, "receipt wait cancelled")
                    .with_hash(hash));
            }
            receipt = ctx.chain.wait_for_receipt(&hash, timeout) => receipt,
        };
        let receipt = receipt.map_err(|e| {
            ModuleError::chain(FailureKind::ReceiptTimeout, e).with_hash(hash.clone())
        })?;
        if !receipt.success {
            return Err(
                ModuleError::new(FailureKind::TransactionReverted, hash.clone()).with_hash(hash)
            );
        }
    }

    let mut info = format!("{} {}", payload.description, payload.amount_in.normalize());
    if let Some(out) = payload.amount_out {
        info.push_str(&format!(" -> {}", out.normalize()));
    }
    Ok(ModuleExecutionResult::success(hash, info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainflow_chain::MockChainClient;
    use chainflow_core::{AmountPolicy, Credential, OperationKind, TaskConfig};
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicU32, Ordering};

    const OWNER: &str = "0x00000000000000000000000000000000000000c1";
    const ROUTER: &str = "0x00000000000000000000000000000000000000d1";

    fn usdc() -> Asset {
        Asset::token("USDC", "0x00000000000000000000000000000000000000aa", 6)
    }

    fn weth() -> Asset {
        Asset::token("WETH", "0x00000000000000000000000000000000000000bb", 18)
    }

    fn native() -> Asset {
        Asset::native("ETH", 18)
    }

    fn task(config: TaskConfig) -> Arc<Task> {
        Arc::new(Task::new(config))
    }

    fn swap_config() -> TaskConfig {
        TaskConfig::new("test", OperationKind::Swap, usdc(), AmountPolicy::UseAllBalance)
            .with_coin_out(weth())
    }

    fn context(task: Arc<Task>, chain: Arc<MockChainClient>) -> ModuleContext {
        ModuleContext {
            task,
            wallet: Arc::new(Wallet::new(OWNER, Credential::new("k"))),
            chain,
            ledger: Arc::new(ExecutionLedger::new()),
            cancel: CancellationToken::new(),
            retry_delay: Duration::from_millis(10),
        }
    }

    /// Module returning a fixed payload or a scripted error.
    #[derive(Default)]
    struct StubModule {
        builds: AtomicU32,
        errors: Mutex<Vec<ModuleError>>,
    }

    impl ModuleContract for StubModule {
        fn build_payload<'a>(
            &'a self,
            _ctx: &'a ModuleContext,
        ) -> BoxFuture<'a, ModuleResult<TransactionPayloadData>> {
            Box::pin(async move {
                self.builds.fetch_add(1, Ordering::SeqCst);
                if let Some(err) = self.errors.lock().pop() {
                    return Err(err);
                }
                Ok(TransactionPayloadData::new(
                    vec![ChainCall::new(ROUTER, vec![0xaa])],
                    Decimal::ONE,
                    "swap USDC->WETH",
                ))
            })
        }
    }

    fn funded_chain() -> Arc<MockChainClient> {
        let chain = Arc::new(MockChainClient::new());
        chain.set_balance(OWNER, &native(), 1_000_000);
        chain
    }

    #[tokio::test]
    async fn test_execute_success() {
        let chain = funded_chain();
        let ctx = context(task(swap_config()), chain.clone());
        let result = StubModule::default().execute(&ctx).await;

        assert!(result.execution_status, "{}", result.execution_info);
        assert!(result.result_hash.is_some());
        assert_eq!(chain.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_insufficient_native_balance() {
        let chain = Arc::new(MockChainClient::new());
        chain.set_balance(OWNER, &native(), 100);
        let ctx = context(task(swap_config()), chain.clone());
        let result = StubModule::default().execute(&ctx).await;

        assert_eq!(result.failure, Some(FailureKind::InsufficientNativeBalance));
        assert!(!result.retry_needed);
        assert!(chain.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_forced_max_fee_skips_estimation() {
        let chain = funded_chain();
        chain.set_fee(Err(ChainError::Timeout("estimate".into())));
        let mut config = swap_config();
        config.fee = FeePolicy::ForcedMax { max_fee_wei: 50_000 };
        let ctx = context(task(config), chain.clone());

        let result = StubModule::default().execute(&ctx).await;
        assert!(result.execution_status, "{}", result.execution_info);
    }

    #[tokio::test]
    async fn test_test_mode_does_not_broadcast() {
        let chain = Arc::new(MockChainClient::new());
        let ctx = context(task(swap_config().with_test_mode(true)), chain.clone());
        let result = StubModule::default().execute(&ctx).await;

        assert!(result.execution_status);
        assert!(result.result_hash.is_none());
        assert!(chain.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_receipt_timeout_keeps_hash_and_is_final() {
        let chain = funded_chain();
        chain.set_receipt(Err(ChainError::Timeout("receipt".into())));
        let ctx = context(task(swap_config().with_receipt(30)), chain.clone());
        let result = StubModule::default().execute(&ctx).await;

        assert_eq!(result.failure, Some(FailureKind::ReceiptTimeout));
        assert!(!result.retry_needed);
        assert!(result.result_hash.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_receipt_wait_keeps_hash() {
        let chain = funded_chain();
        chain.set_receipt_delay(Duration::from_secs(60));
        let ctx = context(task(swap_config().with_receipt(120)), chain.clone());

        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });
        let result = StubModule::default().execute(&ctx).await;

        assert_eq!(result.failure, Some(FailureKind::Cancelled));
        assert!(!result.retry_needed);
        assert_eq!(
            result.result_hash.as_deref(),
            Some(chain.submitted()[0].hash.as_str())
        );
    }

    #[tokio::test]
    async fn test_reverted_receipt_is_retryable() {
        let chain = funded_chain();
        chain.set_receipt(Ok(false));
        let ctx = context(task(swap_config().with_receipt(30)), chain);
        let result = StubModule::default().execute(&ctx).await;

        assert_eq!(result.failure, Some(FailureKind::TransactionReverted));
        assert!(result.retry_needed);
    }

    #[tokio::test]
    async fn test_structural_chain_error_not_retryable() {
        let chain = funded_chain();
        chain.set_sign_error(Some(ChainError::AccountNotDeployed("0xc1".into())));
        let ctx = context(task(swap_config()), chain);
        let result = StubModule::default().execute(&ctx).await;

        assert_eq!(result.failure, Some(FailureKind::AccountNotDeployed));
        assert!(!result.retry_needed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_send_retries_up_to_limit() {
        let chain = funded_chain();
        chain.set_fee(Err(ChainError::Timeout("estimate".into())));
        let ctx = context(task(swap_config()), chain);
        let module = StubModule::default();

        let result = module.try_send(&ctx, 3).await;
        assert_eq!(result.failure, Some(FailureKind::FeeEstimationFailed));
        assert_eq!(module.builds.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_send_stops_on_success() {
        let chain = funded_chain();
        let ctx = context(task(swap_config()), chain);
        let module = StubModule::default();
        module
            .errors
            .lock()
            .push(ModuleError::new(FailureKind::QuoteFailed, "router down"));

        let result = module.try_send(&ctx, 5).await;
        assert!(result.execution_status);
        assert_eq!(module.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_send_stops_on_non_retryable() {
        let chain = funded_chain();
        let ctx = context(task(swap_config()), chain);
        let module = StubModule::default();
        module
            .errors
            .lock()
            .push(ModuleError::new(FailureKind::ZeroBalance, "USDC"));

        let result = module.try_send(&ctx, 5).await;
        assert_eq!(result.failure, Some(FailureKind::ZeroBalance));
        assert_eq!(module.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_send_test_mode_single_attempt() {
        let chain = Arc::new(MockChainClient::new());
        chain.set_fee(Err(ChainError::Timeout("estimate".into())));
        let ctx = context(task(swap_config().with_test_mode(true)), chain);
        let module = StubModule::default();

        let result = module.try_send(&ctx, 5).await;
        assert!(!result.execution_status);
        assert_eq!(module.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reverse_amount_is_exact_delta() {
        let chain = funded_chain();
        chain.set_balance(OWNER, &weth(), 7_500);
        let ctx = context(task(swap_config()), chain.clone());
        ctx.ledger.record(
            ctx.wallet.id(),
            ctx.task.id(),
            LedgerEntry::new().with_raw("balance_out", 2_500),
        );

        let amount = ctx.reverse_amount(&weth(), "balance_out").await.unwrap();
        assert_eq!(amount.raw, 5_000);

        chain.set_balance(OWNER, &weth(), 2_500);
        let err = ctx.reverse_amount(&weth(), "balance_out").await.unwrap_err();
        assert_eq!(err.kind, FailureKind::NoReverseDelta);
    }

    #[tokio::test]
    async fn test_missing_ledger_entry() {
        let ctx = context(task(swap_config()), funded_chain());
        let err = ctx.reverse_amount(&weth(), "balance_out").await.unwrap_err();
        assert_eq!(err.kind, FailureKind::MissingLedgerEntry);
    }

    #[tokio::test]
    async fn test_select_amount_zero_balance() {
        let ctx = context(task(swap_config()), funded_chain());
        let err = ctx.select_amount(&usdc()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::ZeroBalance);
    }

    #[test]
    fn test_amount_overflow_maps_to_invalid_amount() {
        let err = ModuleError::from(CoreError::AmountOverflow("raw amount".into()));
        assert_eq!(err.kind, FailureKind::InvalidAmount);
        assert!(!err.kind.is_retryable());
    }

    #[tokio::test]
    async fn test_select_amount_never_zero() {
        let chain = funded_chain();
        chain.set_balance(OWNER, &usdc(), 5);
        let config = TaskConfig::new(
            "test",
            OperationKind::Swap,
            usdc(),
            AmountPolicy::PercentOfBalance {
                min_percent: 10,
                max_percent: 10,
            },
        )
        .with_coin_out(weth());
        let ctx = context(task(config), chain);

        let err = ctx.select_amount(&usdc()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::InsufficientBalance);
    }

    #[test]
    fn test_approve_call_native_is_none() {
        let ctx = context(task(swap_config()), funded_chain());
        assert!(ctx.approve_call(&native(), ROUTER, 1).unwrap().is_none());
        let call = ctx.approve_call(&usdc(), ROUTER, 1).unwrap().unwrap();
        assert_eq!(call.to, usdc().address.unwrap());
    }
}
