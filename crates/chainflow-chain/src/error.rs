//! Chain client error types.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Account not deployed: {0}")]
    AccountNotDeployed(String),

    #[error("Invalid proxy: {0}")]
    InvalidProxy(String),

    #[error("Transaction reverted: {0}")]
    Reverted(String),
}

impl ChainError {
    /// Structural errors will not go away by retrying.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::AccountNotDeployed(_) | Self::InvalidProxy(_))
    }

    /// Classify a node error message, promoting structural conditions.
    pub fn from_rpc(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        if lower.contains("not deployed") || lower.contains("contract not found") {
            return Self::AccountNotDeployed(message);
        }
        Self::Rpc { code, message }
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

pub type ChainResult<T> = Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_classification() {
        assert!(ChainError::from_rpc(-32000, "Account is not deployed").is_structural());
        assert!(ChainError::from_rpc(20, "Contract not found").is_structural());
        assert!(!ChainError::from_rpc(-32000, "nonce too low").is_structural());
        assert!(ChainError::InvalidProxy("bad".into()).is_structural());
        assert!(!ChainError::Timeout("slow".into()).is_structural());
    }
}
