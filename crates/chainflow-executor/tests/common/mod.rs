//! Shared fixtures for scheduler integration tests.
//!
//! Provides:
//! - Wallet and asset helpers on a shared `MockChainClient`
//! - `ProbeModule`: records per-wallet and global in-flight counts
//! - `SwapProbe` / `ReverseProbe`: balance-snapshot swap pair
//! - `ConcurrencySink`: tracks concurrently active wallets from events

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rust_decimal::Decimal;

use chainflow_chain::{BoxFuture, MockChainClient, MockChainFactory};
use chainflow_core::{
    AmountPolicy, Asset, ChainCall, Credential, FailureKind, ModuleKey, OperationKind, TaskConfig,
    TaskOutcome, TransactionPayloadData, Wallet, WalletId,
};
use chainflow_executor::{
    EngineConfig, EventSink, LedgerEntry, ModuleContext, ModuleContract, ModuleError,
    ModuleResult, RunContext, TaskRegistry,
};

pub const ROUTER: &str = "0x00000000000000000000000000000000000000d1";
pub const FUNDED: u128 = 10_000_000;

pub fn usdc() -> Asset {
    Asset::token("USDC", "0x00000000000000000000000000000000000000aa", 6)
}

pub fn weth() -> Asset {
    Asset::token("WETH", "0x00000000000000000000000000000000000000bb", 18)
}

pub fn eth() -> Asset {
    Asset::native("ETH", 18)
}

pub fn address(n: u8) -> String {
    format!("0x{n:040x}")
}

/// Wallets `1..=count` with native balance for fees.
pub fn wallets(chain: &MockChainClient, count: u8) -> Vec<Wallet> {
    (1..=count)
        .map(|n| {
            let addr = address(n);
            chain.set_balance(&addr, &eth(), FUNDED);
            Wallet::new(addr, Credential::new(format!("key-{n}")))
        })
        .collect()
}

/// Scheduler settings without waits.
pub fn fast_config(concurrency_cap: usize) -> EngineConfig {
    EngineConfig {
        concurrency_cap,
        worker_stagger_ms: 0,
        retry_delay_ms: 0,
        ..EngineConfig::default()
    }
}

pub fn context(config: EngineConfig, registry: TaskRegistry, chain: Arc<MockChainClient>) -> RunContext {
    RunContext::new(config, registry, Arc::new(MockChainFactory::new(chain)))
}

pub fn mint(protocol: &str) -> TaskConfig {
    TaskConfig::new(protocol, OperationKind::Mint, eth(), AmountPolicy::UseAllBalance)
}

pub fn swap() -> TaskConfig {
    TaskConfig::new("v2", OperationKind::Swap, usdc(), AmountPolicy::UseAllBalance)
        .with_coin_out(weth())
}

fn payload(description: &str) -> TransactionPayloadData {
    TransactionPayloadData::new(vec![ChainCall::new(ROUTER, vec![0x01])], Decimal::ONE, description)
}

// ============================================================================
// ProbeModule
// ============================================================================

/// In-flight counters shared by every `ProbeModule` instance.
#[derive(Debug, Default)]
pub struct Probe {
    state: Mutex<ProbeState>,
}

#[derive(Debug, Default)]
struct ProbeState {
    per_wallet: HashMap<WalletId, usize>,
    max_per_wallet: usize,
    active: usize,
    max_active: usize,
    calls: usize,
}

impl Probe {
    fn enter(&self, wallet: &WalletId) {
        let mut s = self.state.lock();
        let n = s.per_wallet.entry(wallet.clone()).or_default();
        *n += 1;
        let n = *n;
        s.max_per_wallet = s.max_per_wallet.max(n);
        s.active += 1;
        s.max_active = s.max_active.max(s.active);
        s.calls += 1;
    }

    fn leave(&self, wallet: &WalletId) {
        let mut s = self.state.lock();
        if let Some(n) = s.per_wallet.get_mut(wallet) {
            *n -= 1;
        }
        s.active -= 1;
    }

    pub fn max_per_wallet(&self) -> usize {
        self.state.lock().max_per_wallet
    }

    pub fn max_active(&self) -> usize {
        self.state.lock().max_active
    }

    pub fn calls(&self) -> usize {
        self.state.lock().calls
    }
}

/// Holds the payload build open for `hold` while counting in-flight calls.
pub struct ProbeModule {
    pub probe: Arc<Probe>,
    pub hold: Duration,
}

impl ModuleContract for ProbeModule {
    fn build_payload<'a>(
        &'a self,
        ctx: &'a ModuleContext,
    ) -> BoxFuture<'a, ModuleResult<TransactionPayloadData>> {
        Box::pin(async move {
            self.probe.enter(ctx.wallet.id());
            tokio::time::sleep(self.hold).await;
            self.probe.leave(ctx.wallet.id());
            Ok(payload("probe"))
        })
    }
}

/// Fails every build with a fixed kind.
pub struct FailingModule {
    pub kind: FailureKind,
    pub probe: Arc<Probe>,
}

impl ModuleContract for FailingModule {
    fn build_payload<'a>(
        &'a self,
        ctx: &'a ModuleContext,
    ) -> BoxFuture<'a, ModuleResult<TransactionPayloadData>> {
        Box::pin(async move {
            self.probe.enter(ctx.wallet.id());
            self.probe.leave(ctx.wallet.id());
            Err(ModuleError::new(self.kind, "scripted"))
        })
    }
}

// ============================================================================
// Swap pair
// ============================================================================

/// Forward swap: records the coin_out balance before execution.
pub struct SwapProbe;

impl ModuleContract for SwapProbe {
    fn snapshot<'a>(&'a self, ctx: &'a ModuleContext) -> BoxFuture<'a, ModuleResult<Option<LedgerEntry>>> {
        Box::pin(async move {
            let Some(coin_out) = &ctx.task.config().coin_out else {
                return Ok(None);
            };
            let before = ctx.balance(coin_out).await?;
            Ok(Some(LedgerEntry::new().with_raw("balance_out", before)))
        })
    }

    fn build_payload<'a>(
        &'a self,
        ctx: &'a ModuleContext,
    ) -> BoxFuture<'a, ModuleResult<TransactionPayloadData>> {
        Box::pin(async move {
            let amount = ctx.select_amount(&ctx.task.config().coin_in).await?;
            Ok(TransactionPayloadData::new(
                vec![ChainCall::new(ROUTER, vec![0x02])],
                amount.to_decimal()?,
                "swap",
            ))
        })
    }
}

/// Reverse swap: sells exactly what the forward swap bought.
pub struct ReverseProbe {
    pub amounts: Arc<Mutex<Vec<u128>>>,
}

impl ModuleContract for ReverseProbe {
    fn build_payload<'a>(
        &'a self,
        ctx: &'a ModuleContext,
    ) -> BoxFuture<'a, ModuleResult<TransactionPayloadData>> {
        Box::pin(async move {
            let coin_out = ctx.task.config().coin_out.clone().ok_or_else(|| {
                ModuleError::new(FailureKind::UnsupportedWallet, "reverse without coin_out")
            })?;
            let amount = ctx.reverse_amount(&coin_out, "balance_out").await?;
            self.amounts.lock().push(amount.raw);
            Ok(TransactionPayloadData::new(
                vec![ChainCall::new(ROUTER, vec![0x03])],
                amount.to_decimal()?,
                "reverse swap",
            ))
        })
    }
}

/// Registry with the swap pair registered under protocol "v2".
pub fn swap_registry(amounts: Arc<Mutex<Vec<u128>>>) -> TaskRegistry {
    let forward = ModuleKey::new("v2", OperationKind::Swap);
    let reverse = ModuleKey::new("v2", OperationKind::ReverseSwap);
    let mut registry = TaskRegistry::new();
    registry
        .register(forward.clone(), || Arc::new(SwapProbe))
        .register(reverse.clone(), move || {
            Arc::new(ReverseProbe {
                amounts: amounts.clone(),
            })
        })
        .register_reverse(forward, reverse);
    registry
}

// ============================================================================
// ConcurrencySink
// ============================================================================

/// Counts wallets between `WalletStarted` and `WalletCompleted`.
#[derive(Debug, Default)]
pub struct ConcurrencySink {
    state: Mutex<SinkState>,
}

#[derive(Debug, Default)]
struct SinkState {
    active: usize,
    max_active: usize,
    wallets_completed: usize,
    tasks_completed: usize,
    outcomes: Vec<TaskOutcome>,
}

impl ConcurrencySink {
    pub fn max_active(&self) -> usize {
        self.state.lock().max_active
    }

    pub fn wallets_completed(&self) -> usize {
        self.state.lock().wallets_completed
    }

    pub fn tasks_completed(&self) -> usize {
        self.state.lock().tasks_completed
    }
}

impl EventSink for ConcurrencySink {
    fn on_wallet_started(&self, _wallet: &WalletId) {
        let mut s = self.state.lock();
        s.active += 1;
        s.max_active = s.max_active.max(s.active);
    }

    fn on_task_completed(
        &self,
        _task: &chainflow_core::Task,
        _wallet: &WalletId,
        outcome: &TaskOutcome,
    ) {
        let mut s = self.state.lock();
        s.tasks_completed += 1;
        s.outcomes.push(outcome.clone());
    }

    fn on_wallet_completed(&self, _wallet: &WalletId) {
        let mut s = self.state.lock();
        s.active -= 1;
        s.wallets_completed += 1;
    }
}
