//! Prometheus metrics and structured logging for chainflow.
//!
//! - Structured logging with tracing (JSON in production)
//! - Prometheus metrics for tasks, retries, wallets and the gas gate

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
