//! Task runner.
//!
//! Drives one task to completion against one wallet:
//! 1. Gas gate (skipped in test mode)
//! 2. Module lookup in the registry
//! 3. Pre-execution snapshot when the task has a reverse action
//! 4. `try_send` with the task's retry budget
//! 5. On success: ledger write, then the virtual reverse task after a
//!    random delay

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use chainflow_chain::DynChainClient;
use chainflow_core::{
    FailureKind, ModuleExecutionResult, ReverseAction, Task, TaskOutcome, Wallet,
};
use chainflow_telemetry::Metrics;

use crate::context::RunContext;
use crate::events::{EventEmitter, LifecycleEvent};
use crate::gas_gate::GasGate;
use crate::module::ModuleContext;
use crate::sleep::{cancellable_sleep, random_delay};

pub struct TaskRunner {
    run: RunContext,
    gas_gate: Option<Arc<GasGate>>,
    events: EventEmitter,
    cancel: CancellationToken,
}

impl TaskRunner {
    pub fn new(
        run: RunContext,
        gas_gate: Option<Arc<GasGate>>,
        events: EventEmitter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run,
            gas_gate,
            events,
            cancel,
        }
    }

    /// Run `task` for `wallet`, followed by its virtual reverse task when
    /// the forward action succeeded and declares one.
    ///
    /// Returns the forward outcome first.
    pub async fn run(
        &self,
        task: &Arc<Task>,
        wallet: &Arc<Wallet>,
        chain: &DynChainClient,
    ) -> Vec<TaskOutcome> {
        let forward = self.run_single(task, wallet, chain).await;
        let succeeded = forward.is_success();
        let mut outcomes = vec![forward];

        if succeeded && !task.is_virtual() {
            if let Some(reverse) = &task.config().reverse {
                if let Some(outcome) = self.run_reverse(task, reverse, wallet, chain).await {
                    outcomes.push(outcome);
                }
            }
        }
        outcomes
    }

    /// Record a task as failed without executing it.
    pub fn skip(&self, task: &Arc<Task>, wallet: &Wallet, result: ModuleExecutionResult) -> TaskOutcome {
        self.start(task, wallet);
        self.finish(task, wallet, &result)
    }

    async fn run_reverse(
        &self,
        task: &Arc<Task>,
        reverse: &ReverseAction,
        wallet: &Arc<Wallet>,
        chain: &DynChainClient,
    ) -> Option<TaskOutcome> {
        let key = task.config().module_key();
        let Some(reverse_key) = self.run.registry.reverse_of(&key) else {
            error!(task_id = %task.id(), %key, "No reverse module registered");
            return None;
        };
        let virtual_task = Arc::new(task.spawn_virtual(reverse_key));

        let delay = random_delay(reverse.min_delay_secs, reverse.max_delay_secs);
        info!(
            wallet = %wallet.id(),
            task_id = %virtual_task.id(),
            delay_secs = delay.as_secs(),
            "Reverse task scheduled"
        );
        if !cancellable_sleep(&self.cancel, delay).await {
            let result = ModuleExecutionResult::failure(
                FailureKind::Cancelled,
                "stopped before reverse action",
            );
            return Some(self.skip(&virtual_task, wallet, result));
        }

        Some(self.run_single(&virtual_task, wallet, chain).await)
    }

    async fn run_single(
        &self,
        task: &Arc<Task>,
        wallet: &Arc<Wallet>,
        chain: &DynChainClient,
    ) -> TaskOutcome {
        self.start(task, wallet);
        let result = self.execute(task, wallet, chain).await;
        self.finish(task, wallet, &result)
    }

    async fn execute(
        &self,
        task: &Arc<Task>,
        wallet: &Arc<Wallet>,
        chain: &DynChainClient,
    ) -> ModuleExecutionResult {
        let config = task.config();

        if !config.test_mode {
            if let Some(gate) = &self.gas_gate {
                let wait = gate.wait(&self.cancel).await;
                if !wait.ok {
                    if self.cancel.is_cancelled() {
                        return ModuleExecutionResult::failure(
                            FailureKind::Cancelled,
                            "stopped during gas wait",
                        );
                    }
                    let last = wait
                        .last_price_wei
                        .map_or_else(|| "unknown".to_string(), |p| p.to_string());
                    return ModuleExecutionResult::failure(
                        FailureKind::GasPriceTooHigh,
                        format!("last {last} wei, target {} wei", gate.config().target_price_wei),
                    );
                }
            }
        }

        let key = config.module_key();
        let Some(module) = self.run.registry.resolve(&key) else {
            return ModuleExecutionResult::failure(FailureKind::UnregisteredModule, key.to_string());
        };

        let ctx = ModuleContext {
            task: task.clone(),
            wallet: wallet.clone(),
            chain: chain.clone(),
            ledger: self.run.ledger.clone(),
            cancel: self.cancel.clone(),
            retry_delay: self.run.config.retry_delay(),
        };

        let snapshot = if !task.is_virtual() && config.reverse.is_some() {
            match module.snapshot(&ctx).await {
                Ok(snapshot) => snapshot,
                Err(e) => return e.into_result(),
            }
        } else {
            None
        };

        let retries = config.retries.unwrap_or(self.run.config.default_retries);
        let result = module.try_send(&ctx, retries).await;

        if result.execution_status {
            if let Some(entry) = snapshot {
                self.run.ledger.record(wallet.id(), task.id(), entry);
            }
        }
        result
    }

    fn start(&self, task: &Arc<Task>, wallet: &Wallet) {
        task.mark_processing(wallet.id());
        info!(
            wallet = %wallet.id(),
            task_id = %task.id(),
            kind = %task.config().kind,
            is_virtual = task.is_virtual(),
            "Task started"
        );
        self.events.emit(LifecycleEvent::TaskStarted {
            task: task.clone(),
            wallet: wallet.id().clone(),
        });
    }

    fn finish(&self, task: &Arc<Task>, wallet: &Wallet, result: &ModuleExecutionResult) -> TaskOutcome {
        let runtime = task.finish(wallet.id(), result);
        let kind = task.config().kind;
        Metrics::task_finished(&kind.to_string(), result.execution_status);

        let outcome = TaskOutcome {
            wallet: wallet.id().clone(),
            task_id: task.id().clone(),
            kind,
            is_virtual: task.is_virtual(),
            status: runtime.status,
            result_hash: runtime.result_hash,
            result_info: runtime.result_info,
            failure: result.failure,
        };

        if outcome.is_success() {
            info!(
                wallet = %wallet.id(),
                task_id = %task.id(),
                tx_hash = outcome.result_hash.as_deref().unwrap_or("-"),
                info = %outcome.result_info,
                "Task succeeded"
            );
        } else {
            warn!(
                wallet = %wallet.id(),
                task_id = %task.id(),
                info = %outcome.result_info,
                "Task failed"
            );
        }

        self.events.emit(LifecycleEvent::TaskCompleted {
            task: task.clone(),
            wallet: wallet.id().clone(),
            outcome: outcome.clone(),
        });
        outcome
    }
}
