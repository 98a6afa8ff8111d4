//! Chain client abstraction.
//!
//! Provides a trait-based abstraction over account/contract RPC, signing,
//! fee estimation and broadcast. This allows for:
//! - Dependency injection for testing
//! - One client session per wallet worker (own proxy, own connection)
//! - Swapping the concrete chain backend without touching modules

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chainflow_core::{Asset, ChainCall, Wallet};

use crate::error::ChainResult;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Signed transaction ready for fee estimation and broadcast.
///
/// Opaque to the engine; only the chain client that produced it
/// interprets `raw`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// Encoded signed transactions, submitted in order.
    pub raw: Vec<Vec<u8>>,
    /// Hash of the final transaction (hex with 0x prefix).
    pub hash: String,
    /// Fee implied by the signed gas parameters (wei), if known.
    pub fee_hint: Option<u128>,
}

/// Mined transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub tx_hash: String,
    /// Whether execution succeeded on chain.
    pub success: bool,
    pub block_number: Option<u64>,
}

/// Chain access for one wallet session.
pub trait ChainClient: Send + Sync {
    /// Balance of `asset` held by `owner`, in raw units.
    fn get_balance<'a>(&'a self, owner: &'a str, asset: &'a Asset)
        -> BoxFuture<'a, ChainResult<u128>>;

    /// Token decimals as reported on chain.
    fn decimals<'a>(&'a self, asset: &'a Asset) -> BoxFuture<'a, ChainResult<u8>>;

    /// Read-only contract call returning raw return data.
    fn call<'a>(&'a self, call: &'a ChainCall) -> BoxFuture<'a, ChainResult<Vec<u8>>>;

    /// Sign the calls on behalf of `wallet`.
    fn sign<'a>(
        &'a self,
        wallet: &'a Wallet,
        calls: &'a [ChainCall],
    ) -> BoxFuture<'a, ChainResult<SignedTransaction>>;

    /// Estimate the fee (wei) of a signed transaction.
    fn estimate_fee<'a>(&'a self, tx: &'a SignedTransaction) -> BoxFuture<'a, ChainResult<u128>>;

    /// Broadcast a signed transaction, returning its hash.
    fn submit<'a>(&'a self, tx: &'a SignedTransaction) -> BoxFuture<'a, ChainResult<String>>;

    /// Wait for a receipt. Errors with `ChainError::Timeout` after `timeout`.
    fn wait_for_receipt<'a>(
        &'a self,
        tx_hash: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, ChainResult<TransactionReceipt>>;
}

/// Arc wrapper for ChainClient trait objects.
pub type DynChainClient = Arc<dyn ChainClient>;

/// Opens a chain client session for a wallet.
pub trait ChainClientFactory: Send + Sync {
    /// Connect on behalf of `wallet`, routing through its proxy if any.
    fn connect<'a>(&'a self, wallet: &'a Wallet) -> BoxFuture<'a, ChainResult<DynChainClient>>;
}
