//! Execution ledger.
//!
//! Per (wallet, task) key-value store passing data from a forward action to
//! its reverse counterpart, e.g. the balance of the received coin captured
//! before a swap. Shared by all wallet workers; each key is written
//! atomically and there are no cross-key transactions.

use std::collections::HashMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use chainflow_core::{TaskId, WalletId};

/// A single ledger value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerValue {
    /// Raw token amount.
    Raw(u128),
    Decimals(u8),
    Text(String),
}

/// Values captured for one (wallet, task).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    values: HashMap<String, LedgerValue>,
}

impl LedgerEntry {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: LedgerValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_raw(self, key: impl Into<String>, raw: u128) -> Self {
        self.with(key, LedgerValue::Raw(raw))
    }

    #[must_use]
    pub fn with_decimals(self, key: impl Into<String>, decimals: u8) -> Self {
        self.with(key, LedgerValue::Decimals(decimals))
    }

    pub fn get(&self, key: &str) -> Option<&LedgerValue> {
        self.values.get(key)
    }

    /// Raw amount stored under `key`.
    pub fn raw(&self, key: &str) -> Option<u128> {
        match self.values.get(key) {
            Some(LedgerValue::Raw(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn decimals(&self, key: &str) -> Option<u8> {
        match self.values.get(key) {
            Some(LedgerValue::Decimals(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(LedgerValue::Text(v)) => Some(v),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Concurrent ledger scoped to one run.
#[derive(Debug, Default)]
pub struct ExecutionLedger {
    entries: DashMap<(WalletId, TaskId), LedgerEntry>,
}

impl ExecutionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the entry for (wallet, task), replacing a previous one.
    pub fn record(&self, wallet: &WalletId, task: &TaskId, entry: LedgerEntry) {
        self.entries.insert((wallet.clone(), task.clone()), entry);
    }

    pub fn get(&self, wallet: &WalletId, task: &TaskId) -> Option<LedgerEntry> {
        self.entries
            .get(&(wallet.clone(), task.clone()))
            .map(|e| e.value().clone())
    }

    pub fn contains(&self, wallet: &WalletId, task: &TaskId) -> bool {
        self.entries.contains_key(&(wallet.clone(), task.clone()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries (between runs).
    pub fn clear(&self) {
        self.entries.clear();
    }
}
