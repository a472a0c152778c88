//! Operation Ledger.
//!
//! Records the explicit test operations issued during a run (manual
//! failovers and the like) so the log validator can tell which shards were
//! touched on purpose.

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::cluster::{Operation, OperationKind};

/// A single entry in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// When the operation was issued.
    pub recorded_at: SystemTime,
    /// What was issued, and against which target.
    pub operation: Operation,
}

/// Append-only record of issued operations.
#[derive(Debug, Default, Clone)]
pub struct OperationLedger {
    /// In issue order.
    entries: Vec<LedgerEntry>,
}

impl OperationLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        OperationLedger {
            entries: Vec::new(),
        }
    }

    /// Record an operation against `target_node`.
    pub fn record(&mut self, kind: OperationKind, target_node: impl Into<String>) {
        self.entries.push(LedgerEntry {
            recorded_at: SystemTime::now(),
            operation: Operation::new(kind, target_node),
        });
    }

    /// Every entry with its timestamp.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// The recorded operations in issue order, as the validator consumes them.
    pub fn operations(&self) -> Vec<Operation> {
        self.entries.iter().map(|e| e.operation.clone()).collect()
    }

    /// Only the explicit failovers.
    pub fn failovers(&self) -> impl Iterator<Item = &Operation> {
        self.entries
            .iter()
            .map(|e| &e.operation)
            .filter(|op| op.is_failover())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget everything recorded, for reuse across runs.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Thread-safe ledger shared between operation issuers.
#[derive(Debug, Default, Clone)]
pub struct SharedLedger {
    inner: Arc<Mutex<OperationLedger>>,
}

impl SharedLedger {
    /// Empty shared ledger; clones record into the same ledger.
    pub fn new() -> Self {
        SharedLedger::default()
    }

    /// Record an operation against `target_node`.
    pub fn record(&self, kind: OperationKind, target_node: impl Into<String>) {
        self.inner.lock().unwrap().record(kind, target_node);
    }

    /// Copy of the ledger for validation.
    pub fn snapshot(&self) -> OperationLedger {
        self.inner.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}
