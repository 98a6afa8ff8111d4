//! Prometheus metrics for the chainflow engine.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, a programming error that surfaces on first
//! use during static initialization.

use std::path::Path;

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram, register_int_counter, register_int_gauge,
    CounterVec, Encoder, Histogram, IntCounter, IntGauge, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Finished tasks.
/// Labels: kind (operation kind), status (success/failed)
pub static TASKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "chainflow_tasks_total",
        "Total tasks finished",
        &["kind", "status"]
    )
    .unwrap()
});

/// Module execution attempts, including retries.
pub static TASK_ATTEMPTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "chainflow_task_attempts_total",
        "Total module execution attempts",
        &["kind"]
    )
    .unwrap()
});

/// Wallet workers currently running.
pub static ACTIVE_WALLETS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("chainflow_active_wallets", "Wallet workers currently running").unwrap()
});

/// Wallets that finished their task list.
pub static WALLETS_COMPLETED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "chainflow_wallets_completed_total",
        "Total wallets that finished their task list"
    )
    .unwrap()
});

/// Time spent waiting for the gas price target.
pub static GAS_WAIT_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "chainflow_gas_wait_seconds",
        "Time spent waiting for the gas price target in seconds",
        vec![0.0, 1.0, 5.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]
    )
    .unwrap()
});

/// Last observed gas price.
pub static GAS_PRICE_WEI: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("chainflow_gas_price_wei", "Last observed gas price in wei").unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record a finished task.
    pub fn task_finished(kind: &str, success: bool) {
        let status = if success { "success" } else { "failed" };
        TASKS_TOTAL.with_label_values(&[kind, status]).inc();
    }

    /// Record one module execution attempt.
    pub fn task_attempt(kind: &str) {
        TASK_ATTEMPTS_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn wallet_started() {
        ACTIVE_WALLETS.inc();
    }

    pub fn wallet_completed() {
        ACTIVE_WALLETS.dec();
        WALLETS_COMPLETED_TOTAL.inc();
    }

    /// Record a finished gas wait.
    pub fn gas_wait(seconds: f64) {
        GAS_WAIT_SECONDS.observe(seconds);
    }

    /// Record an observed gas price (saturates at i64::MAX).
    pub fn gas_price(price_wei: u128) {
        GAS_PRICE_WEI.set(i64::try_from(price_wei).unwrap_or(i64::MAX));
    }

    /// Text exposition of all registered metrics.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }

    /// Write the text exposition to `path`.
    pub fn write_to(path: &Path) -> TelemetryResult<()> {
        std::fs::write(path, Self::render()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_recorded_metrics() {
        Metrics::task_finished("swap", true);
        Metrics::task_attempt("swap");
        Metrics::gas_price(u128::MAX);

        let text = Metrics::render().unwrap();
        assert!(text.contains("chainflow_tasks_total"));
        assert!(text.contains("chainflow_task_attempts_total"));
        assert_eq!(GAS_PRICE_WEI.get(), i64::MAX);
    }
}
