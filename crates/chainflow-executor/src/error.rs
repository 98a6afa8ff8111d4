//! Executor error types.
//!
//! Only batch-level problems surface as errors. Failures of individual
//! tasks are reported through `ModuleExecutionResult` and `TaskOutcome`.

use chainflow_core::{CoreError, ModuleKey, TaskId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Batch has no wallets")]
    EmptyBatch,

    #[error("Duplicate wallet id: {0}")]
    DuplicateWallet(String),

    #[error("Invalid task {task_id}: {source}")]
    InvalidTask {
        task_id: TaskId,
        #[source]
        source: CoreError,
    },

    #[error("No module registered for {0}")]
    UnregisteredModule(ModuleKey),

    #[error("No reverse module registered for {0}")]
    NoReverseModule(ModuleKey),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Scheduler stopped")]
    Stopped,
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
