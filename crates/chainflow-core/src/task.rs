//! Task configuration and runtime state.
//!
//! A [`Task`] is one configured action (swap, liquidity, bridge, mint,
//! transfer...) replayed against every wallet of a batch. Configuration is
//! immutable; runtime status is recorded per wallet because the same task
//! runs once for each of them.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::execution::ModuleExecutionResult;
use crate::wallet::WalletId;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique task identifier, stable for the task's lifetime.
///
/// Used as the task component of execution ledger keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a new random task ID.
    ///
    /// Format: `task_{uuid_short}`
    #[must_use]
    pub fn new() -> Self {
        let uuid_short = &Uuid::new_v4().to_string()[..8];
        Self(format!("task_{uuid_short}"))
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// ID of the virtual task derived from this one.
    #[must_use]
    pub fn reverse(&self) -> Self {
        Self(format!("{}:reverse", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Protocol identifier (e.g. "v2router", "erc20").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolId(String);

impl ProtocolId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operation kind performed by a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Swap,
    /// Sell back what a forward swap bought. Only meaningful as a virtual task.
    ReverseSwap,
    AddLiquidity,
    RemoveLiquidity,
    Bridge,
    Mint,
    Transfer,
}

impl OperationKind {
    /// Whether tasks of this kind need the wallet's pair address.
    #[must_use]
    pub fn requires_pair_address(&self) -> bool {
        matches!(self, Self::Bridge | Self::Transfer)
    }

    /// Whether tasks of this kind move one coin into a different one.
    #[must_use]
    pub fn is_two_sided(&self) -> bool {
        matches!(
            self,
            Self::Swap | Self::ReverseSwap | Self::AddLiquidity | Self::RemoveLiquidity
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Swap => "swap",
            Self::ReverseSwap => "reverse_swap",
            Self::AddLiquidity => "add_liquidity",
            Self::RemoveLiquidity => "remove_liquidity",
            Self::Bridge => "bridge",
            Self::Mint => "mint",
            Self::Transfer => "transfer",
        };
        write!(f, "{s}")
    }
}

/// Registry key: which module implements a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleKey {
    pub protocol: ProtocolId,
    pub kind: OperationKind,
}

impl ModuleKey {
    pub fn new(protocol: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            protocol: ProtocolId::new(protocol),
            kind,
        }
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.protocol, self.kind)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// A token or the chain's native coin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    /// Display symbol (e.g. "USDC").
    pub symbol: String,
    /// Token contract address; `None` for the native coin.
    #[serde(default)]
    pub address: Option<String>,
    /// Token decimals if known; fetched from chain otherwise.
    #[serde(default)]
    pub decimals: Option<u8>,
}

impl Asset {
    /// The chain's native coin.
    pub fn native(symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            address: None,
            decimals: Some(decimals),
        }
    }

    /// An ERC-20 style token.
    pub fn token(symbol: impl Into<String>, address: impl Into<String>, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            address: Some(address.into()),
            decimals: Some(decimals),
        }
    }

    #[must_use]
    pub fn is_native(&self) -> bool {
        self.address.is_none()
    }

    /// Whether two assets refer to the same coin.
    #[must_use]
    pub fn same_coin(&self, other: &Asset) -> bool {
        match (&self.address, &other.address) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// How much of the input coin a task moves.
///
/// Exactly one policy determines the amount at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AmountPolicy {
    /// Move the entire balance.
    UseAllBalance,
    /// Move a uniformly drawn whole percent in `[min_percent, max_percent]`.
    PercentOfBalance { min_percent: u32, max_percent: u32 },
    /// Move a uniformly drawn decimal amount in `[min, max]`, capped by the balance.
    FixedRange { min: Decimal, max: Decimal },
}

/// Fee policy for submitted transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FeePolicy {
    /// Estimate the fee through the chain client.
    #[default]
    Auto,
    /// Skip estimation and pay up to this fee (wei).
    ForcedMax { max_fee_wei: u128 },
}

/// Reverse-action settings for tasks that spawn a virtual counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReverseAction {
    #[serde(default)]
    pub min_delay_secs: u64,
    #[serde(default)]
    pub max_delay_secs: u64,
}

fn default_slippage_percent() -> Decimal {
    Decimal::ONE
}

fn default_receipt_timeout_secs() -> u64 {
    120
}

/// Immutable task configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Protocol identifier.
    pub protocol: ProtocolId,
    /// Operation performed.
    pub kind: OperationKind,
    /// Coin spent by the task.
    pub coin_in: Asset,
    /// Coin received by the task (swaps, liquidity).
    #[serde(default)]
    pub coin_out: Option<Asset>,
    /// Amount policy.
    pub amount: AmountPolicy,
    /// Slippage tolerance in percent. Default: 1.
    #[serde(default = "default_slippage_percent")]
    pub slippage_percent: Decimal,
    /// Fee policy. Default: auto-estimate.
    #[serde(default)]
    pub fee: FeePolicy,
    /// Whether to wait for the transaction receipt.
    #[serde(default)]
    pub wait_for_receipt: bool,
    /// Receipt wait timeout (seconds). Default: 120.
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    /// Minimum delay before the next task of the same wallet (seconds).
    #[serde(default)]
    pub min_delay_secs: u64,
    /// Maximum delay before the next task of the same wallet (seconds).
    #[serde(default)]
    pub max_delay_secs: u64,
    /// Simulate without broadcasting.
    #[serde(default)]
    pub test_mode: bool,
    /// Attempts for this task; engine default when unset.
    #[serde(default)]
    pub retries: Option<u32>,
    /// Spawn a reverse virtual task after success.
    #[serde(default)]
    pub reverse: Option<ReverseAction>,
}

impl TaskConfig {
    /// Minimal configuration with defaults for every optional field.
    pub fn new(
        protocol: impl Into<String>,
        kind: OperationKind,
        coin_in: Asset,
        amount: AmountPolicy,
    ) -> Self {
        Self {
            protocol: ProtocolId::new(protocol),
            kind,
            coin_in,
            coin_out: None,
            amount,
            slippage_percent: default_slippage_percent(),
            fee: FeePolicy::Auto,
            wait_for_receipt: false,
            receipt_timeout_secs: default_receipt_timeout_secs(),
            min_delay_secs: 0,
            max_delay_secs: 0,
            test_mode: false,
            retries: None,
            reverse: None,
        }
    }

    #[must_use]
    pub fn with_coin_out(mut self, coin_out: Asset) -> Self {
        self.coin_out = Some(coin_out);
        self
    }

    /// Wait up to `timeout_secs` for a receipt after broadcast.
    #[must_use]
    pub fn with_receipt(mut self, timeout_secs: u64) -> Self {
        self.wait_for_receipt = true;
        self.receipt_timeout_secs = timeout_secs;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, min_secs: u64, max_secs: u64) -> Self {
        self.min_delay_secs = min_secs;
        self.max_delay_secs = max_secs;
        self
    }

    #[must_use]
    pub fn with_reverse(mut self, min_delay_secs: u64, max_delay_secs: u64) -> Self {
        self.reverse = Some(ReverseAction {
            min_delay_secs,
            max_delay_secs,
        });
        self
    }

    #[must_use]
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Registry key for this configuration.
    #[must_use]
    pub fn module_key(&self) -> ModuleKey {
        ModuleKey {
            protocol: self.protocol.clone(),
            kind: self.kind,
        }
    }
}

// ============================================================================
// Runtime State
// ============================================================================

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    Pending,
    Processing,
    Success,
    Failed,
}

impl TaskStatus {
    /// Returns true if the status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Mutable runtime state of a task for one wallet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRuntime {
    pub status: TaskStatus,
    /// Transaction identifier of the last attempt, if any.
    pub result_hash: Option<String>,
    /// Human-readable outcome.
    pub result_info: String,
}

#[derive(Debug, Default)]
struct TaskProgress {
    latest: TaskRuntime,
    per_wallet: HashMap<WalletId, TaskRuntime>,
}

/// One configured action plus its runtime status.
///
/// Created by the caller; mutated only by the task runner.
#[derive(Debug)]
pub struct Task {
    id: TaskId,
    config: TaskConfig,
    is_virtual: bool,
    parent: Option<TaskId>,
    progress: Mutex<TaskProgress>,
}

impl Task {
    /// Create a task with a fresh ID.
    pub fn new(config: TaskConfig) -> Self {
        Self::with_id(TaskId::new(), config)
    }

    /// Create a task with an explicit ID.
    pub fn with_id(id: TaskId, config: TaskConfig) -> Self {
        Self {
            id,
            config,
            is_virtual: false,
            parent: None,
            progress: Mutex::new(TaskProgress::default()),
        }
    }

    /// Build the virtual counterpart of this task for the given reverse module.
    ///
    /// Shared configuration is copied; the virtual task never carries a
    /// reverse action of its own.
    #[must_use]
    pub fn spawn_virtual(&self, reverse: &ModuleKey) -> Task {
        let mut config = self.config.clone();
        config.protocol = reverse.protocol.clone();
        config.kind = reverse.kind;
        config.reverse = None;
        Task {
            id: self.id.reverse(),
            config,
            is_virtual: true,
            parent: Some(self.id.clone()),
            progress: Mutex::new(TaskProgress::default()),
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    /// Forward task this virtual task was derived from.
    pub fn parent(&self) -> Option<&TaskId> {
        self.parent.as_ref()
    }

    /// Task ID under which ledger data for this task is stored.
    pub fn ledger_task_id(&self) -> &TaskId {
        self.parent.as_ref().unwrap_or(&self.id)
    }

    /// Most recent status across wallets.
    pub fn status(&self) -> TaskStatus {
        self.progress.lock().latest.status
    }

    /// Most recent runtime state across wallets.
    pub fn latest(&self) -> TaskRuntime {
        self.progress.lock().latest.clone()
    }

    /// Runtime state for one wallet.
    pub fn outcome(&self, wallet: &WalletId) -> Option<TaskRuntime> {
        self.progress.lock().per_wallet.get(wallet).cloned()
    }

    /// Mark the task as processing for a wallet.
    pub fn mark_processing(&self, wallet: &WalletId) {
        self.record(
            wallet,
            TaskRuntime {
                status: TaskStatus::Processing,
                result_hash: None,
                result_info: String::new(),
            },
        );
    }

    /// Record the terminal state for a wallet from a module result.
    pub fn finish(&self, wallet: &WalletId, result: &ModuleExecutionResult) -> TaskRuntime {
        let runtime = TaskRuntime {
            status: if result.execution_status {
                TaskStatus::Success
            } else {
                TaskStatus::Failed
            },
            result_hash: result.result_hash.clone(),
            result_info: result.execution_info.clone(),
        };
        self.record(wallet, runtime.clone());
        runtime
    }

    fn record(&self, wallet: &WalletId, runtime: TaskRuntime) {
        let mut progress = self.progress.lock();
        progress.latest = runtime.clone();
        progress.per_wallet.insert(wallet.clone(), runtime);
    }
}
