//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Batch error: {0}")]
    Batch(String),

    #[error("Chain error: {0}")]
    Chain(#[from] chainflow_chain::ChainError),

    #[error("Executor error: {0}")]
    Executor(#[from] chainflow_executor::ExecutorError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] chainflow_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for AppError {
    fn from(e: ::config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
