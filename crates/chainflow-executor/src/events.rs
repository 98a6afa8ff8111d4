//! Lifecycle events.
//!
//! Workers publish events on an unbounded channel; a single dispatcher task
//! forwards them to the caller's [`EventSink`], so sink callbacks never run
//! concurrently and events of one wallet arrive in emission order.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use chainflow_core::{Task, TaskId, TaskOutcome, WalletId};

/// Event emitted by the scheduler.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    WalletStarted {
        wallet: WalletId,
    },
    TaskStarted {
        task: Arc<Task>,
        wallet: WalletId,
    },
    TaskCompleted {
        task: Arc<Task>,
        wallet: WalletId,
        outcome: TaskOutcome,
    },
    WalletCompleted {
        wallet: WalletId,
    },
}

/// Progress callbacks consumed by the caller.
pub trait EventSink: Send + Sync {
    fn on_wallet_started(&self, _wallet: &WalletId) {}

    fn on_task_started(&self, _task: &Task, _wallet: &WalletId) {}

    fn on_task_completed(&self, _task: &Task, _wallet: &WalletId, _outcome: &TaskOutcome) {}

    fn on_wallet_completed(&self, _wallet: &WalletId) {}
}

/// Arc wrapper for EventSink trait objects.
pub type DynEventSink = Arc<dyn EventSink>;

/// Sink that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {}

/// Event as seen by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    WalletStarted(WalletId),
    TaskStarted(WalletId, TaskId),
    TaskCompleted(TaskOutcome),
    WalletCompleted(WalletId),
}

/// Sink that records every event in delivery order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&RecordedEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    /// Events of one wallet, in delivery order.
    pub fn for_wallet(&self, wallet: &WalletId) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| match e {
                RecordedEvent::WalletStarted(w)
                | RecordedEvent::TaskStarted(w, _)
                | RecordedEvent::WalletCompleted(w) => w == wallet,
                RecordedEvent::TaskCompleted(outcome) => &outcome.wallet == wallet,
            })
            .cloned()
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn on_wallet_started(&self, wallet: &WalletId) {
        self.events
            .lock()
            .push(RecordedEvent::WalletStarted(wallet.clone()));
    }

    fn on_task_started(&self, task: &Task, wallet: &WalletId) {
        self.events
            .lock()
            .push(RecordedEvent::TaskStarted(wallet.clone(), task.id().clone()));
    }

    fn on_task_completed(&self, _task: &Task, _wallet: &WalletId, outcome: &TaskOutcome) {
        self.events
            .lock()
            .push(RecordedEvent::TaskCompleted(outcome.clone()));
    }

    fn on_wallet_completed(&self, wallet: &WalletId) {
        self.events
            .lock()
            .push(RecordedEvent::WalletCompleted(wallet.clone()));
    }
}

/// Handle used by workers to publish events.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl EventEmitter {
    pub fn emit(&self, event: LifecycleEvent) {
        // Send only fails once the dispatcher is gone, i.e. after the run.
        let _ = self.tx.send(event);
    }
}

/// Start the dispatcher. It exits once every emitter has been dropped.
pub fn spawn_dispatcher(sink: DynEventSink) -> (EventEmitter, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<LifecycleEvent>();
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            dispatch(sink.as_ref(), &event);
        }
        debug!("Event dispatcher stopped (channel closed)");
    });
    (EventEmitter { tx }, handle)
}

fn dispatch(sink: &dyn EventSink, event: &LifecycleEvent) {
    match event {
        LifecycleEvent::WalletStarted { wallet } => sink.on_wallet_started(wallet),
        LifecycleEvent::TaskStarted { task, wallet } => sink.on_task_started(task, wallet),
        LifecycleEvent::TaskCompleted {
            task,
            wallet,
            outcome,
        } => sink.on_task_completed(task, wallet, outcome),
        LifecycleEvent::WalletCompleted { wallet } => sink.on_wallet_completed(wallet),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatcher_delivers_in_order_and_exits() {
        let sink = Arc::new(RecordingSink::new());
        let (emitter, handle) = spawn_dispatcher(sink.clone());
        let w1 = WalletId::new("w1");
        let w2 = WalletId::new("w2");

        let other = emitter.clone();
        emitter.emit(LifecycleEvent::WalletStarted { wallet: w1.clone() });
        other.emit(LifecycleEvent::WalletStarted { wallet: w2.clone() });
        emitter.emit(LifecycleEvent::WalletCompleted { wallet: w1.clone() });
        drop(emitter);
        drop(other);
        handle.await.unwrap();

        assert_eq!(
            sink.events(),
            vec![
                RecordedEvent::WalletStarted(w1.clone()),
                RecordedEvent::WalletStarted(w2),
                RecordedEvent::WalletCompleted(w1.clone()),
            ]
        );
        assert_eq!(sink.for_wallet(&w1).len(), 2);
    }
}
