//! Wallet task execution engine.
//!
//! Runs an ordered list of tasks for many wallets under a concurrency cap,
//! with retries, gas gating and reverse-task chaining.
//!
//! # Key Components
//!
//! - [`WalletScheduler`]: One worker per wallet, bounded concurrency, stop
//! - [`TaskRunner`]: Gas gate, module lookup, snapshot, retries, ledger write
//! - [`ModuleContract`]: Protocol plug-in interface with the shared
//!   sign/estimate/submit pipeline
//! - [`TaskRegistry`]: `(protocol, kind)` to module resolution
//! - [`GasGate`]: Exponential-backoff wait for a target gas price
//! - [`ExecutionLedger`]: Pre-execution values consumed by reverse tasks
//! - [`EventSink`]: Lifecycle callbacks, delivered from a single task
//!
//! # Task Flow (per wallet, in order)
//!
//! 1. Proxy validation and chain session (failure fails every task)
//! 2. Gas gate -> GasPriceTooHigh
//! 3. Registry lookup -> UnregisteredModule
//! 4. Snapshot (tasks with a reverse action)
//! 5. try_send with the task's retry budget
//! 6. Ledger write, then the virtual reverse task after a random delay
//! 7. Random delay before the next task

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod gas_gate;
pub mod ledger;
pub mod module;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod sleep;

// Configuration
pub use config::{EngineConfig, GasGateConfig};
pub use context::RunContext;

// Error types
pub use error::{ExecutorError, ExecutorResult};

// Lifecycle events
pub use events::{
    spawn_dispatcher, DynEventSink, EventEmitter, EventSink, LifecycleEvent, NoopSink,
    RecordedEvent, RecordingSink,
};

// Gas gating
pub use gas_gate::{GasGate, GasWait};

// Ledger
pub use ledger::{ExecutionLedger, LedgerEntry, LedgerValue};

// Modules and registry
pub use module::{ModuleContext, ModuleContract, ModuleError, ModuleResult};
pub use registry::{ModuleFactory, TaskRegistry};

// Execution
pub use runner::TaskRunner;
pub use scheduler::{validate_batch, RunReport, WalletScheduler};
pub use sleep::{cancellable_sleep, random_delay};
