//! Wallet scheduler.
//!
//! Top-level engine. One worker per wallet, at most `concurrency_cap`
//! workers at a time, started with a small stagger. Within a wallet tasks
//! run strictly in order with a random delay between them.
//!
//! # Guarantees
//!
//! - No two tasks of the same wallet run concurrently
//! - `WalletCompleted` is emitted exactly once for every started wallet
//! - A failed task or wallet never aborts other wallets
//! - `stop()` lets in-flight chain calls finish, starts nothing new, and
//!   returns once every worker has exited

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use chainflow_chain::ChainError;
use chainflow_core::{
    validate_task_config, validate_task_for_wallet, FailureKind, ModuleExecutionResult, Task,
    TaskOutcome, TaskStatus, Wallet, WalletId,
};
use chainflow_telemetry::Metrics;

use crate::context::RunContext;
use crate::error::{ExecutorError, ExecutorResult};
use crate::events::{spawn_dispatcher, EventEmitter, LifecycleEvent};
use crate::registry::TaskRegistry;
use crate::runner::TaskRunner;
use crate::sleep::{cancellable_sleep, random_delay};

// ============================================================================
// Validation
// ============================================================================

/// Reject a batch before anything is scheduled.
///
/// Checks task configuration, module registration (including the reverse
/// module of tasks with a reverse action), wallet requirements of each
/// task, and wallet list sanity.
pub fn validate_batch(
    wallets: &[Wallet],
    tasks: &[Task],
    registry: &TaskRegistry,
) -> ExecutorResult<()> {
    if wallets.is_empty() {
        return Err(ExecutorError::EmptyBatch);
    }

    let mut seen = HashSet::new();
    for wallet in wallets {
        if !seen.insert(wallet.id()) {
            return Err(ExecutorError::DuplicateWallet(wallet.id().to_string()));
        }
    }

    for task in tasks {
        let config = task.config();
        validate_task_config(config).map_err(|source| ExecutorError::InvalidTask {
            task_id: task.id().clone(),
            source,
        })?;

        let key = config.module_key();
        if !registry.contains(&key) {
            return Err(ExecutorError::UnregisteredModule(key));
        }
        if config.reverse.is_some() {
            match registry.reverse_of(&key) {
                Some(reverse) if registry.contains(reverse) => {}
                _ => return Err(ExecutorError::NoReverseModule(key)),
            }
        }

        for wallet in wallets {
            validate_task_for_wallet(config, wallet).map_err(|source| {
                ExecutorError::InvalidTask {
                    task_id: task.id().clone(),
                    source,
                }
            })?;
        }
    }
    Ok(())
}

// ============================================================================
// RunReport
// ============================================================================

/// Summary of a run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Every task outcome, forward and virtual, in completion order.
    pub outcomes: Vec<TaskOutcome>,
    pub wallets_started: usize,
    pub wallets_completed: usize,
    /// Whether the run was stopped early.
    pub stopped: bool,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == TaskStatus::Failed)
            .count()
    }

    /// Outcomes of one wallet, in completion order.
    pub fn for_wallet<'a>(&'a self, wallet: &'a WalletId) -> impl Iterator<Item = &'a TaskOutcome> {
        self.outcomes.iter().filter(move |o| &o.wallet == wallet)
    }
}

// ============================================================================
// WalletScheduler
// ============================================================================

/// Emits `WalletCompleted` when dropped, so it fires exactly once however
/// the worker exits.
struct WalletGuard {
    wallet: WalletId,
    events: EventEmitter,
    completed: Arc<Mutex<usize>>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for WalletGuard {
    fn drop(&mut self) {
        *self.completed.lock() += 1;
        Metrics::wallet_completed();
        info!(wallet = %self.wallet, "Wallet completed");
        self.events.emit(LifecycleEvent::WalletCompleted {
            wallet: self.wallet.clone(),
        });
    }
}

pub struct WalletScheduler {
    run: RunContext,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl WalletScheduler {
    pub fn new(run: RunContext) -> Self {
        Self {
            run,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.run
    }

    /// Token cancelled by [`Self::stop`].
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every task, in order, for every wallet.
    ///
    /// Tasks are shared by all wallets; their runtime state is recorded per
    /// wallet. The ledger is cleared at the start of the run.
    pub async fn run(&self, wallets: Vec<Wallet>, tasks: Vec<Task>) -> ExecutorResult<RunReport> {
        if self.cancel.is_cancelled() {
            return Err(ExecutorError::Stopped);
        }
        validate_batch(&wallets, &tasks, &self.run.registry)?;
        let gas_gate = self.run.gas_gate()?.map(Arc::new);

        let config = &self.run.config;
        let (wallets, tasks) = self.order(wallets, tasks);
        let tasks: Arc<Vec<Arc<Task>>> = Arc::new(tasks.into_iter().map(Arc::new).collect());

        info!(
            wallets = wallets.len(),
            tasks = tasks.len(),
            concurrency_cap = config.concurrency_cap,
            "Run started"
        );

        self.run.ledger.clear();
        self.tracker.reopen();

        let (events, dispatcher) = spawn_dispatcher(self.run.sink.clone());
        let runner = Arc::new(TaskRunner::new(
            self.run.clone(),
            gas_gate,
            events.clone(),
            self.cancel.clone(),
        ));
        let semaphore = Arc::new(Semaphore::new(config.concurrency_cap.max(1)));
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let completed = Arc::new(Mutex::new(0usize));
        let mut started = 0usize;

        for (idx, wallet) in wallets.into_iter().enumerate() {
            if idx > 0 && !cancellable_sleep(&self.cancel, config.worker_stagger()).await {
                break;
            }
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            // Stop may land while the permit is being handed over.
            if self.cancel.is_cancelled() {
                break;
            }

            started += 1;
            let wallet = Arc::new(wallet);
            Metrics::wallet_started();
            info!(wallet = %wallet.id(), "Wallet started");
            events.emit(LifecycleEvent::WalletStarted {
                wallet: wallet.id().clone(),
            });
            let guard = WalletGuard {
                wallet: wallet.id().clone(),
                events: events.clone(),
                completed: completed.clone(),
                _permit: permit,
            };

            let worker = WalletWorker {
                run: self.run.clone(),
                runner: runner.clone(),
                wallet,
                tasks: tasks.clone(),
                outcomes: outcomes.clone(),
                cancel: self.cancel.clone(),
            };
            self.tracker.spawn(async move {
                let _guard = guard;
                worker.process().await;
            });
        }

        self.tracker.close();
        self.tracker.wait().await;

        drop(runner);
        drop(events);
        if let Err(e) = dispatcher.await {
            warn!(error = %e, "Event dispatcher failed");
        }

        let outcomes = std::mem::take(&mut *outcomes.lock());
        let wallets_completed = *completed.lock();
        let report = RunReport {
            outcomes,
            wallets_started: started,
            wallets_completed,
            stopped: self.cancel.is_cancelled(),
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            wallets = report.wallets_completed,
            stopped = report.stopped,
            "Run finished"
        );
        Ok(report)
    }

    /// Stop admitting wallets and tasks, then wait for running workers.
    ///
    /// In-flight chain calls complete; cancellable waits return early.
    pub async fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!("Stop requested");
        }
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    fn order(&self, mut wallets: Vec<Wallet>, mut tasks: Vec<Task>) -> (Vec<Wallet>, Vec<Task>) {
        let config = &self.run.config;
        let mut rng = rand::thread_rng();
        if config.shuffle_wallets {
            wallets.shuffle(&mut rng);
        }
        if config.shuffle_tasks {
            tasks.shuffle(&mut rng);
        }
        if let Some(cap) = config.test_mode_wallet_cap {
            if tasks.iter().any(|t| t.config().test_mode) && wallets.len() > cap {
                info!(cap, total = wallets.len(), "Test mode: limiting wallets");
                wallets.truncate(cap);
            }
        }
        (wallets, tasks)
    }
}

// ============================================================================
// WalletWorker
// ============================================================================

struct WalletWorker {
    run: RunContext,
    runner: Arc<TaskRunner>,
    wallet: Arc<Wallet>,
    tasks: Arc<Vec<Arc<Task>>>,
    outcomes: Arc<Mutex<Vec<TaskOutcome>>>,
    cancel: CancellationToken,
}

impl WalletWorker {
    async fn process(&self) {
        if let Some(proxy) = self.wallet.proxy() {
            if let Err(e) = self.run.proxy_provider.validate(proxy).await {
                warn!(wallet = %self.wallet.id(), error = %e, "Proxy validation failed");
                self.fail_all(FailureKind::InvalidProxy, &e.to_string());
                return;
            }
        }

        let chain = match self.run.chain_factory.connect(&self.wallet).await {
            Ok(chain) => chain,
            Err(e) => {
                warn!(wallet = %self.wallet.id(), error = %e, "Chain session failed");
                let kind = match e {
                    ChainError::InvalidProxy(_) => FailureKind::InvalidProxy,
                    ChainError::AccountNotDeployed(_) => FailureKind::AccountNotDeployed,
                    _ => FailureKind::Rpc,
                };
                self.fail_all(kind, &e.to_string());
                return;
            }
        };

        let count = self.tasks.len();
        for (idx, task) in self.tasks.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(wallet = %self.wallet.id(), remaining = count - idx, "Stopped before task");
                return;
            }

            // A failed task never stops the wallet; later tasks may still succeed.
            let outcomes = self.runner.run(task, &self.wallet, &chain).await;
            self.outcomes.lock().extend(outcomes);

            if idx + 1 < count {
                let config = task.config();
                let delay = random_delay(config.min_delay_secs, config.max_delay_secs);
                if !cancellable_sleep(&self.cancel, delay).await {
                    return;
                }
            }
        }
    }

    /// Report every task as failed without running it.
    fn fail_all(&self, kind: FailureKind, reason: &str) {
        for task in self.tasks.iter() {
            let result = ModuleExecutionResult::failure(kind, reason);
            let outcome = self.runner.skip(task, &self.wallet, result);
            self.outcomes.lock().push(outcome);
        }
    }
}
