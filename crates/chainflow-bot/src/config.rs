//! Application configuration.
//!
//! Loaded from a TOML file, then overlaid with `CHAINFLOW__SECTION__KEY`
//! environment variables.

use ::config::{Config, Environment, File, FileFormat, Map};
use chainflow_core::decimal_to_raw_floor;
use chainflow_executor::{EngineConfig, GasGateConfig};
use chainflow_modules::ModulesConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Prefix of overlay environment variables.
pub const ENV_PREFIX: &str = "CHAINFLOW";

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "CHAINFLOW_CONFIG";

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Wallet admission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Wallets processed concurrently. Default: 4.
    #[serde(default = "default_concurrency_cap")]
    pub concurrency_cap: usize,
    /// Delay between wallet admissions (ms). Default: 500.
    #[serde(default = "default_worker_stagger_ms")]
    pub worker_stagger_ms: u64,
    /// Wallets run when any task is in test mode.
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

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency_cap: default_concurrency_cap(),
            worker_stagger_ms: default_worker_stagger_ms(),
            test_mode_wallet_cap: None,
            shuffle_wallets: false,
            shuffle_tasks: false,
        }
    }
}

/// Task retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts for tasks without their own `retries`. Default: 3.
    #[serde(default = "default_retries")]
    pub default_retries: u32,
    /// Delay between attempts (ms). Default: 5000.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            default_retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Gas gate settings, with the target in gwei.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasConfig {
    pub target_gwei: Decimal,
    /// Maximum wait for an acceptable price (seconds).
    pub timeout_secs: u64,
    /// Fail the task when the wait times out. Default: true.
    #[serde(default = "default_true")]
    pub timeout_enforced: bool,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_first_error_retry_secs")]
    pub first_error_retry_secs: u64,
    /// Optional cap on the doubled poll delay (ms).
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_base_delay_ms() -> u64 {
    5_000
}

fn default_first_error_retry_secs() -> u64 {
    60
}

impl GasConfig {
    pub fn target_price_wei(&self) -> AppResult<u128> {
        decimal_to_raw_floor(self.target_gwei, 9)
            .map_err(|e| AppError::Config(format!("gas.target_gwei: {e}")))
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Write the Prometheus text exposition here after the run.
    #[serde(default)]
    pub metrics_path: Option<String>,
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Simulate the chain in memory instead of using `rpc_url`.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub gas: Option<GasConfig>,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub modules: ModulesConfig,
}

impl AppConfig {
    /// Load `path` with the process environment overlaid.
    pub fn load(path: &str) -> AppResult<Self> {
        Self::build(File::new(path, FileFormat::Toml), None)
    }

    /// Parse TOML text, overlaying `env` instead of the process environment.
    pub fn from_toml_str(content: &str, env: Map<String, String>) -> AppResult<Self> {
        Self::build(File::from_str(content, FileFormat::Toml), Some(env))
    }

    fn build<S>(file: S, env: Option<Map<String, String>>) -> AppResult<Self>
    where
        S: ::config::Source + Send + Sync + 'static,
    {
        let overlay = Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .source(env);
        let config: Self = Config::builder()
            .add_source(file)
            .add_source(overlay)
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        if self.scheduler.concurrency_cap == 0 {
            return Err(AppError::Config(
                "scheduler.concurrency_cap must be at least 1".to_string(),
            ));
        }
        if !self.dry_run && self.rpc_url.is_empty() {
            return Err(AppError::Config("rpc_url is required".to_string()));
        }
        if let Some(gas) = &self.gas {
            gas.target_price_wei()?;
        }
        Ok(())
    }

    /// Engine settings for the executor.
    pub fn engine_config(&self) -> AppResult<EngineConfig> {
        let gas = match &self.gas {
            Some(gas) => Some(GasGateConfig {
                target_price_wei: gas.target_price_wei()?,
                timeout_secs: gas.timeout_secs,
                timeout_enforced: gas.timeout_enforced,
                base_delay_ms: gas.base_delay_ms,
                first_error_retry_secs: gas.first_error_retry_secs,
                max_delay_ms: gas.max_delay_ms,
            }),
            None => None,
        };
        Ok(EngineConfig {
            concurrency_cap: self.scheduler.concurrency_cap,
            worker_stagger_ms: self.scheduler.worker_stagger_ms,
            default_retries: self.retry.default_retries,
            retry_delay_ms: self.retry.retry_delay_ms,
            gas,
            test_mode_wallet_cap: self.scheduler.test_mode_wallet_cap,
            shuffle_wallets: self.scheduler.shuffle_wallets,
            shuffle_tasks: self.scheduler.shuffle_tasks,
        })
    }
}
