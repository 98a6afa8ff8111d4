//! In-memory chain for tests and dry runs.
//!
//! `MockChainClient` keeps balances in memory, records every signed and
//! submitted transaction, and can be scripted to fail individual steps.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use chainflow_core::{Asset, ChainCall, Wallet};

use crate::client::{
    BoxFuture, ChainClient, ChainClientFactory, DynChainClient, SignedTransaction,
    TransactionReceipt,
};
use crate::error::{ChainError, ChainResult};
use crate::oracle::GasPriceOracle;

fn asset_key(asset: &Asset) -> String {
    asset
        .address
        .as_deref()
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "native".to_string())
}

type BalanceKey = (String, String);
type CallHandler = Arc<dyn Fn(&ChainCall) -> ChainResult<Vec<u8>> + Send + Sync>;

/// Balance change applied when a transaction is submitted.
#[derive(Debug, Clone)]
pub struct BalanceEffect {
    pub owner: String,
    pub asset: Asset,
    pub balance: u128,
}

/// Mock chain client.
pub struct MockChainClient {
    balances: Mutex<HashMap<BalanceKey, u128>>,
    default_decimals: u8,
    fee: Mutex<ChainResult<u128>>,
    sign_error: Mutex<Option<ChainError>>,
    submit_results: Mutex<VecDeque<ChainResult<String>>>,
    submit_effects: Mutex<VecDeque<Vec<BalanceEffect>>>,
    receipt: Mutex<ChainResult<bool>>,
    receipt_delay: Mutex<Duration>,
    call_handler: Mutex<Option<CallHandler>>,
    balance_reads: AtomicU64,
    signed: Mutex<Vec<Vec<ChainCall>>>,
    submitted: Mutex<Vec<SignedTransaction>>,
    next_hash: AtomicU64,
}

impl std::fmt::Debug for MockChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockChainClient")
            .field("balances", &self.balances.lock().len())
            .field("submitted", &self.submitted.lock().len())
            .finish()
    }
}

impl Default for MockChainClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChainClient {
    /// Create an empty chain with a 21000-wei fee.
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            default_decimals: 18,
            fee: Mutex::new(Ok(21_000)),
            sign_error: Mutex::new(None),
            submit_results: Mutex::new(VecDeque::new()),
            submit_effects: Mutex::new(VecDeque::new()),
            receipt: Mutex::new(Ok(true)),
            receipt_delay: Mutex::new(Duration::ZERO),
            call_handler: Mutex::new(None),
            balance_reads: AtomicU64::new(0),
            signed: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            next_hash: AtomicU64::new(1),
        }
    }

    /// Set a balance.
    pub fn set_balance(&self, owner: &str, asset: &Asset, raw: u128) {
        self.balances
            .lock()
            .insert((owner.to_ascii_lowercase(), asset_key(asset)), raw);
    }

    /// Current balance (0 if never set).
    pub fn balance(&self, owner: &str, asset: &Asset) -> u128 {
        self.balances
            .lock()
            .get(&(owner.to_ascii_lowercase(), asset_key(asset)))
            .copied()
            .unwrap_or(0)
    }

    /// Set the fee estimation result.
    pub fn set_fee(&self, fee: ChainResult<u128>) {
        *self.fee.lock() = fee;
    }

    /// Make signing fail.
    pub fn set_sign_error(&self, error: Option<ChainError>) {
        *self.sign_error.lock() = error;
    }

    /// Queue a result for the next submit; defaults to a generated hash.
    pub fn push_submit_result(&self, result: ChainResult<String>) {
        self.submit_results.lock().push_back(result);
    }

    /// Queue balance changes applied by the next successful submit.
    pub fn push_submit_effect(&self, effects: Vec<BalanceEffect>) {
        self.submit_effects.lock().push_back(effects);
    }

    /// Set the receipt result (`Ok(false)` = reverted).
    pub fn set_receipt(&self, receipt: ChainResult<bool>) {
        *self.receipt.lock() = receipt;
    }

    /// Delay before a receipt is returned.
    pub fn set_receipt_delay(&self, delay: Duration) {
        *self.receipt_delay.lock() = delay;
    }

    /// Answer read-only calls.
    pub fn set_call_handler(
        &self,
        handler: impl Fn(&ChainCall) -> ChainResult<Vec<u8>> + Send + Sync + 'static,
    ) {
        *self.call_handler.lock() = Some(Arc::new(handler));
    }

    /// Calls passed to `sign`, one entry per signing.
    pub fn signed_calls(&self) -> Vec<Vec<ChainCall>> {
        self.signed.lock().clone()
    }

    /// Transactions passed to `submit`.
    pub fn submitted(&self) -> Vec<SignedTransaction> {
        self.submitted.lock().clone()
    }

    /// Number of balance reads served.
    pub fn balance_reads(&self) -> u64 {
        self.balance_reads.load(Ordering::SeqCst)
    }
}

impl ChainClient for MockChainClient {
    fn get_balance<'a>(
        &'a self,
        owner: &'a str,
        asset: &'a Asset,
    ) -> BoxFuture<'a, ChainResult<u128>> {
        Box::pin(async move {
            self.balance_reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.balance(owner, asset))
        })
    }

    fn decimals<'a>(&'a self, asset: &'a Asset) -> BoxFuture<'a, ChainResult<u8>> {
        Box::pin(async move { Ok(asset.decimals.unwrap_or(self.default_decimals)) })
    }

    fn call<'a>(&'a self, call: &'a ChainCall) -> BoxFuture<'a, ChainResult<Vec<u8>>> {
        Box::pin(async move {
            let handler = self.call_handler.lock().clone();
            match handler {
                Some(handler) => handler(call),
                None => Err(ChainError::Rpc {
                    code: -32601,
                    message: format!("no call handler for {}", call.to),
                }),
            }
        })
    }

    fn sign<'a>(
        &'a self,
        _wallet: &'a Wallet,
        calls: &'a [ChainCall],
    ) -> BoxFuture<'a, ChainResult<SignedTransaction>> {
        Box::pin(async move {
            if let Some(err) = self.sign_error.lock().clone() {
                return Err(err);
            }
            self.signed.lock().push(calls.to_vec());
            let n = self.next_hash.fetch_add(1, Ordering::SeqCst);
            Ok(SignedTransaction {
                raw: calls.iter().map(|c| c.data.clone()).collect(),
                hash: format!("0x{n:064x}"),
                fee_hint: None,
            })
        })
    }

    fn estimate_fee<'a>(&'a self, _tx: &'a SignedTransaction) -> BoxFuture<'a, ChainResult<u128>> {
        Box::pin(async move { self.fee.lock().clone() })
    }

    fn submit<'a>(&'a self, tx: &'a SignedTransaction) -> BoxFuture<'a, ChainResult<String>> {
        Box::pin(async move {
            let result = self
                .submit_results
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(tx.hash.clone()));
            if result.is_ok() {
                self.submitted.lock().push(tx.clone());
                if let Some(effects) = self.submit_effects.lock().pop_front() {
                    for effect in effects {
                        self.set_balance(&effect.owner, &effect.asset, effect.balance);
                    }
                }
            }
            result
        })
    }

    fn wait_for_receipt<'a>(
        &'a self,
        tx_hash: &'a str,
        _timeout: Duration,
    ) -> BoxFuture<'a, ChainResult<TransactionReceipt>> {
        Box::pin(async move {
            let delay = *self.receipt_delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let success = self.receipt.lock().clone()?;
            Ok(TransactionReceipt {
                tx_hash: tx_hash.to_string(),
                success,
                block_number: Some(1),
            })
        })
    }
}

/// Factory handing out one shared mock client.
#[derive(Debug, Clone)]
pub struct MockChainFactory {
    client: Arc<MockChainClient>,
    failing_wallets: Arc<Mutex<HashMap<String, ChainError>>>,
    connects: Arc<AtomicU64>,
}

impl MockChainFactory {
    pub fn new(client: Arc<MockChainClient>) -> Self {
        Self {
            client,
            failing_wallets: Arc::new(Mutex::new(HashMap::new())),
            connects: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Make `connect` fail for one wallet.
    pub fn fail_wallet(&self, address: &str, error: ChainError) {
        self.failing_wallets
            .lock()
            .insert(address.to_ascii_lowercase(), error);
    }

    /// Number of sessions opened.
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }
}

impl ChainClientFactory for MockChainFactory {
    fn connect<'a>(&'a self, wallet: &'a Wallet) -> BoxFuture<'a, ChainResult<DynChainClient>> {
        Box::pin(async move {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self
                .failing_wallets
                .lock()
                .get(&wallet.address().to_ascii_lowercase())
            {
                return Err(err.clone());
            }
            let client: DynChainClient = self.client.clone();
            Ok(client)
        })
    }
}

/// Scripted gas price oracle.
///
/// Returns queued results in order, then repeats the last one. Records the
/// instant of every poll.
#[derive(Debug)]
pub struct MockGasOracle {
    script: Mutex<VecDeque<ChainResult<u128>>>,
    last: Mutex<ChainResult<u128>>,
    polls: Mutex<Vec<Instant>>,
}

impl MockGasOracle {
    /// Oracle that always reports `price`.
    pub fn constant(price: u128) -> Self {
        Self::scripted(Vec::new(), Ok(price))
    }

    /// Oracle that plays `script` and then keeps returning `then`.
    pub fn scripted(script: Vec<ChainResult<u128>>, then: ChainResult<u128>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(then),
            polls: Mutex::new(Vec::new()),
        }
    }

    /// Instants at which the oracle was polled.
    pub fn poll_instants(&self) -> Vec<Instant> {
        self.polls.lock().clone()
    }

    pub fn poll_count(&self) -> usize {
        self.polls.lock().len()
    }
}

impl GasPriceOracle for MockGasOracle {
    fn gas_price_wei(&self) -> BoxFuture<'_, ChainResult<u128>> {
        Box::pin(async move {
            self.polls.lock().push(Instant::now());
            let next = self.script.lock().pop_front();
            match next {
                Some(result) => result,
                None => self.last.lock().clone(),
            }
        })
    }
}
