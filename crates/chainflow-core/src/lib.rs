//! Core domain types for the chainflow wallet task engine.
//!
//! This crate provides fundamental types used throughout the engine:
//! - `Task`, `TaskConfig`: One configured on-chain action and its runtime status
//! - `Wallet`: Credential, address, proxy and pair address
//! - `AmountPolicy` + [`select_amount`]: Balance-driven amount selection
//! - `ModuleExecutionResult`, `TransactionPayloadData`: Module boundary types
//! - `TokenAmount`: Raw/decimal unit conversion

pub mod amount;
pub mod decimal;
pub mod error;
pub mod execution;
pub mod task;
pub mod validation;
pub mod wallet;

pub use amount::select_amount;
pub use decimal::{decimal_to_raw_ceil, decimal_to_raw_floor, raw_to_decimal, TokenAmount};
pub use error::{CoreError, CoreResult};
pub use execution::{
    ChainCall, FailureKind, ModuleExecutionResult, TaskOutcome, TransactionPayloadData,
};
pub use task::{
    AmountPolicy, Asset, FeePolicy, ModuleKey, OperationKind, ProtocolId, ReverseAction, Task,
    TaskConfig, TaskId, TaskRuntime, TaskStatus,
};
pub use validation::{validate_task_config, validate_task_for_wallet};
pub use wallet::{Credential, Wallet, WalletId};
