//! Error types for chainflow-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Wallet balance is zero")]
    ZeroBalance,

    #[error("Insufficient balance: have {balance}, need at least {required}")]
    InsufficientBalance { balance: String, required: String },

    #[error("Amount overflow: {0}")]
    AmountOverflow(String),

    #[error("Unsupported token decimals: {0}")]
    UnsupportedDecimals(u8),

    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Invalid wallet: {0}")]
    InvalidWallet(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
