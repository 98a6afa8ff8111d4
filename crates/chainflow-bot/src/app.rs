//! Main application orchestration.
//!
//! Wires the chain backend, gas oracle, module registry and event sink into
//! a `WalletScheduler`, runs one batch and reports the outcome.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chainflow_chain::{
    ChainClientFactory, DynGasOracle, JsonRpcChainFactory, JsonRpcGasOracle, MockChainClient,
    MockChainFactory, MockGasOracle, RpcSettings,
};
use chainflow_core::{Task, TaskOutcome, WalletId};
use chainflow_executor::{EventSink, RunContext, RunReport, TaskRegistry, WalletScheduler};
use chainflow_telemetry::Metrics;
use tracing::{info, warn};

use crate::batch::Batch;
use crate::config::AppConfig;
use crate::error::AppResult;

/// Logs progress as tasks complete.
#[derive(Debug, Default)]
pub struct ProgressSink {
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl ProgressSink {
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }
}

impl EventSink for ProgressSink {
    fn on_task_completed(&self, _task: &Task, wallet: &WalletId, outcome: &TaskOutcome) {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if !outcome.is_success() {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        info!(
            %wallet,
            task_id = %outcome.task_id,
            status = %outcome.status,
            completed,
            "Task completed"
        );
    }
}

/// Main application.
pub struct Application {
    config: AppConfig,
    batch: Batch,
    progress: Arc<ProgressSink>,
}

impl Application {
    pub fn new(config: AppConfig, batch: Batch) -> Self {
        Self {
            config,
            batch,
            progress: Arc::new(ProgressSink::default()),
        }
    }

    pub fn progress(&self) -> Arc<ProgressSink> {
        self.progress.clone()
    }

    fn registry(&self) -> AppResult<TaskRegistry> {
        let mut registry = TaskRegistry::new();
        chainflow_modules::register_defaults(&mut registry, &self.config.modules)?;
        Ok(registry)
    }

    /// In-memory chain seeded with the batch's dry-run balances.
    fn simulated_chain(&self) -> Arc<MockChainClient> {
        let chain = Arc::new(MockChainClient::new());
        for seed in &self.batch.seeds {
            chain.set_balance(&seed.owner, &seed.asset, seed.raw);
        }
        chain
    }

    fn run_context(&self) -> AppResult<RunContext> {
        let engine = self.config.engine_config()?;
        let target = engine.gas.as_ref().map(|gas| gas.target_price_wei);

        let factory: Arc<dyn ChainClientFactory>;
        let mut oracle: Option<DynGasOracle> = None;
        if self.config.dry_run {
            info!(seeds = self.batch.seeds.len(), "Dry run: using simulated chain");
            factory = Arc::new(MockChainFactory::new(self.simulated_chain()));
            if let Some(price) = target {
                // Always at target so the gate never blocks a dry run.
                oracle = Some(Arc::new(MockGasOracle::constant(price)));
            }
        } else {
            let settings = RpcSettings::new(&self.config.rpc_url, self.config.chain_id);
            factory = Arc::new(JsonRpcChainFactory::new(settings));
            if target.is_some() {
                oracle = Some(Arc::new(JsonRpcGasOracle::new(&self.config.rpc_url)?));
            }
        }

        let mut run = RunContext::new(engine, self.registry()?, factory)
            .with_sink(self.progress.clone());
        if let Some(oracle) = oracle {
            run = run.with_gas_oracle(oracle);
        }
        Ok(run)
    }

    /// Run the batch until every wallet finishes or Ctrl-C stops it.
    pub async fn run(self) -> AppResult<RunReport> {
        let run = self.run_context()?;
        let scheduler = Arc::new(WalletScheduler::new(run));

        let stopper = scheduler.clone();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Shutdown signal received, stopping after in-flight tasks");
                stopper.stop().await;
            }
        });

        let Batch { wallets, tasks, .. } = self.batch;
        let result = scheduler.run(wallets, tasks).await;
        ctrl_c.abort();
        let report = result?;

        if let Some(path) = &self.config.telemetry.metrics_path {
            match Metrics::write_to(Path::new(path)) {
                Ok(()) => info!(path = %path, "Metrics written"),
                Err(e) => warn!(path = %path, error = %e, "Failed to write metrics"),
            }
        }
        Ok(report)
    }
}

/// One line per task outcome plus totals.
pub fn format_report(report: &RunReport) -> String {
    let mut lines = Vec::with_capacity(report.outcomes.len() + 1);
    for outcome in &report.outcomes {
        let marker = if outcome.is_virtual { " (reverse)" } else { "" };
        let hash = outcome.result_hash.as_deref().unwrap_or("-");
        lines.push(format!(
            "{wallet} {task}{marker}: {status} [{hash}] {info}",
            wallet = outcome.wallet,
            task = outcome.task_id,
            status = outcome.status,
            info = outcome.result_info,
        ));
    }
    lines.push(format!(
        "wallets {}/{} completed, tasks {} succeeded, {} failed{}",
        report.wallets_completed,
        report.wallets_started,
        report.succeeded(),
        report.failed(),
        if report.stopped { " (stopped)" } else { "" },
    ));
    lines.join("\n")
}
