//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scheduler and retry settings, read once at run start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum wallets processed concurrently. Default: 4.
    #[serde(default = "default_concurrency_cap")]
    pub concurrency_cap: usize,
    /// Delay between starting consecutive wallet workers (ms). Default: 500.
    #[serde(default = "default_worker_stagger_ms")]
    pub worker_stagger_ms: u64,
    /// Attempts per task when the task sets none. Default: 3.
    #[serde(default = "default_retries")]
    pub default_retries: u32,
    /// Delay between attempts (ms). Default: 5,000.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Gas price gate. Disabled when absent.
    #[serde(default)]
    pub gas: Option<GasGateConfig>,
    /// When any task runs in test mode, only the first N wallets run.
    #[serde(default)]
    pub test_mode_wallet_cap: Option<usize>,
    #[serde(default)]
    pub shuffle_wallets: bool,
    #[serde(default)]
    pub shuffle_tasks: bool,
}

fn default_concurrency_cap() -> usize {
    4
}

fn default_worker_stagger_ms() -> u64 {
    500
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency_cap: default_concurrency_cap(),
            worker_stagger_ms: default_worker_stagger_ms(),
            default_retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            gas: None,
            test_mode_wallet_cap: None,
            shuffle_wallets: false,
            shuffle_tasks: false,
        }
    }
}

impl EngineConfig {
    pub fn worker_stagger(&self) -> Duration {
        Duration::from_millis(self.worker_stagger_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Gas price gate settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasGateConfig {
    /// Proceed once the gas price is at or below this value (wei).
    pub target_price_wei: u128,
    /// Give up after this long when `timeout_enforced`.
    pub timeout_secs: u64,
    /// Without enforcement the gate waits until the target is met.
    #[serde(default = "default_timeout_enforced")]
    pub timeout_enforced: bool,
    /// First backoff delay (ms), doubled after every poll. Default: 5,000.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Wait before retrying a failed first poll (s). Default: 60.
    #[serde(default = "default_first_error_retry_secs")]
    pub first_error_retry_secs: u64,
    /// Optional upper bound on the doubled delay (ms). Default: unbounded.
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

fn default_timeout_enforced() -> bool {
    true
}

fn default_base_delay_ms() -> u64 {
    5_000
}

fn default_first_error_retry_secs() -> u64 {
    60
}

impl GasGateConfig {
    pub fn new(target_price_wei: u128, timeout_secs: u64) -> Self {
        Self {
            target_price_wei,
            timeout_secs,
            timeout_enforced: default_timeout_enforced(),
            base_delay_ms: default_base_delay_ms(),
            first_error_retry_secs: default_first_error_retry_secs(),
            max_delay_ms: None,
        }
    }
}
