//! Chain access for chainflow.
//!
//! External collaborators of the execution engine:
//! - `ChainClient` / `ChainClientFactory`: balances, calls, signing, fees,
//!   broadcast and receipts, one session per wallet
//! - `GasPriceOracle`: gas price source for the gas gate
//! - `ProxyProvider`: per-wallet outbound route validation
//!
//! Implementations:
//! - `rpc`: JSON-RPC over HTTP for EVM-compatible chains
//! - `mock`: in-memory chain for tests and dry runs

pub mod abi;
pub mod client;
pub mod error;
pub mod mock;
pub mod oracle;
pub mod rpc;

pub use client::{
    BoxFuture, ChainClient, ChainClientFactory, DynChainClient, SignedTransaction,
    TransactionReceipt,
};
pub use error::{ChainError, ChainResult};
pub use mock::{BalanceEffect, MockChainClient, MockChainFactory, MockGasOracle};
pub use oracle::{DynGasOracle, DynProxyProvider, GasPriceOracle, ProxyProvider, StaticProxyProvider};
pub use rpc::{JsonRpcChainClient, JsonRpcChainFactory, JsonRpcClient, JsonRpcGasOracle, RpcSettings};
