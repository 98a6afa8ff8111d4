//! chainflow command-line runner.
//!
//! Loads the application config and a batch file, then runs every task for
//! every wallet through the `WalletScheduler`:
//! - JSON-RPC chain backend, or an in-memory chain for dry runs
//! - Gas gate backed by `eth_gasPrice`
//! - Ctrl-C stops admission and waits for in-flight tasks

pub mod app;
pub mod batch;
pub mod config;
pub mod error;

pub use app::{format_report, Application, ProgressSink};
pub use batch::{Batch, BatchFile};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
