//! Module boundary types.
//!
//! This module provides types for:
//! - Failure classification (`FailureKind`) and retry semantics
//! - Module results (`ModuleExecutionResult`)
//! - Transaction payloads (`ChainCall`, `TransactionPayloadData`)
//! - Per-wallet task outcomes for run reports

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::task::{OperationKind, TaskId, TaskStatus};
use crate::wallet::WalletId;

// ============================================================================
// Failure Classification
// ============================================================================

/// Why a module invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Wallet holds none of the input coin.
    ZeroBalance,
    /// Balance below the amount policy minimum.
    InsufficientBalance,
    /// Amount policy cannot be expressed in the token's raw units.
    InvalidAmount,
    /// Price/route query failed.
    QuoteFailed,
    /// Fee estimation failed.
    FeeEstimationFailed,
    /// Not enough native coin to pay the fee.
    InsufficientNativeBalance,
    /// Transaction signing failed.
    SigningFailed,
    /// Broadcast failed.
    BroadcastFailed,
    /// Receipt did not arrive in time.
    ReceiptTimeout,
    /// Transaction was mined but reverted.
    TransactionReverted,
    /// Account contract is not deployed.
    AccountNotDeployed,
    /// Proxy failed validation.
    InvalidProxy,
    /// Wallet type or configuration unsupported by the protocol.
    UnsupportedWallet,
    /// Gas price stayed above target until the gate timed out.
    GasPriceTooHigh,
    /// Virtual task found no ledger entry for its forward task.
    MissingLedgerEntry,
    /// Virtual task found no balance gained since the forward task.
    NoReverseDelta,
    /// No module registered for the task's (protocol, kind).
    UnregisteredModule,
    /// Run was stopped before the task could proceed.
    Cancelled,
    /// Generic RPC failure.
    Rpc,
}

impl FailureKind {
    /// Whether another attempt may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::QuoteFailed
                | Self::FeeEstimationFailed
                | Self::SigningFailed
                | Self::BroadcastFailed
                | Self::TransactionReverted
                | Self::Rpc
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ZeroBalance => "zero balance",
            Self::InsufficientBalance => "insufficient balance",
            Self::InvalidAmount => "invalid amount",
            Self::QuoteFailed => "quote failed",
            Self::FeeEstimationFailed => "fee estimation failed",
            Self::InsufficientNativeBalance => "insufficient native balance for fee",
            Self::SigningFailed => "signing failed",
            Self::BroadcastFailed => "broadcast failed",
            Self::ReceiptTimeout => "receipt timeout",
            Self::TransactionReverted => "transaction reverted",
            Self::AccountNotDeployed => "account not deployed",
            Self::InvalidProxy => "invalid proxy",
            Self::UnsupportedWallet => "unsupported wallet",
            Self::GasPriceTooHigh => "gas price above target",
            Self::MissingLedgerEntry => "missing ledger entry",
            Self::NoReverseDelta => "nothing to reverse",
            Self::UnregisteredModule => "unregistered module",
            Self::Cancelled => "cancelled",
            Self::Rpc => "rpc error",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Module Result
// ============================================================================

/// Result of one module invocation.
///
/// Failure is communicated here, never by panicking across the module
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleExecutionResult {
    /// Whether the action succeeded.
    pub execution_status: bool,
    /// Whether another attempt may help.
    pub retry_needed: bool,
    /// Free-text outcome.
    pub execution_info: String,
    /// Transaction hash, if one was produced.
    pub result_hash: Option<String>,
    /// Failure classification when `execution_status` is false.
    pub failure: Option<FailureKind>,
}

impl ModuleExecutionResult {
    pub fn success(hash: impl Into<String>, info: impl Into<String>) -> Self {
        Self {
            execution_status: true,
            retry_needed: false,
            execution_info: info.into(),
            result_hash: Some(hash.into()),
            failure: None,
        }
    }

    /// Success that produced no transaction (test mode).
    pub fn simulated(info: impl Into<String>) -> Self {
        Self {
            execution_status: true,
            retry_needed: false,
            execution_info: info.into(),
            result_hash: None,
            failure: None,
        }
    }

    /// Failure classified by kind; retry semantics follow the kind.
    pub fn failure(kind: FailureKind, info: impl Into<String>) -> Self {
        Self {
            execution_status: false,
            retry_needed: kind.is_retryable(),
            execution_info: format!("{kind}: {}", info.into()),
            result_hash: None,
            failure: Some(kind),
        }
    }

    #[must_use]
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.result_hash = Some(hash.into());
        self
    }
}

// ============================================================================
// Transaction Payload
// ============================================================================

/// One on-chain call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCall {
    /// Target contract (or recipient) address.
    pub to: String,
    /// ABI-encoded calldata.
    pub data: Vec<u8>,
    /// Native value attached (wei).
    pub value: u128,
}

impl ChainCall {
    pub fn new(to: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            to: to.into(),
            data,
            value: 0,
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: u128) -> Self {
        self.value = value;
        self
    }
}

/// Calls to submit plus decimal-normalized amounts for logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPayloadData {
    pub calls: Vec<ChainCall>,
    /// Amount spent, in decimal units of the input coin.
    pub amount_in: Decimal,
    /// Expected amount received, in decimal units of the output coin.
    pub amount_out: Option<Decimal>,
    /// Short description, e.g. "swap 1.5 USDC -> ETH".
    pub description: String,
}

impl TransactionPayloadData {
    pub fn new(calls: Vec<ChainCall>, amount_in: Decimal, description: impl Into<String>) -> Self {
        Self {
            calls,
            amount_in,
            amount_out: None,
            description: description.into(),
        }
    }

    #[must_use]
    pub fn with_amount_out(mut self, amount_out: Decimal) -> Self {
        self.amount_out = Some(amount_out);
        self
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Terminal result of one task for one wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub wallet: WalletId,
    pub task_id: TaskId,
    pub kind: OperationKind,
    pub is_virtual: bool,
    pub status: TaskStatus,
    pub result_hash: Option<String>,
    pub result_info: String,
    /// Failure classification of a failed task.
    pub failure: Option<FailureKind>,
}

impl TaskOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}
