//! Lock and transaction providers used by the runner for group nodes.
//!
//! The runner only needs acquire/release and begin/commit/rollback; how a
//! lock is held or a transaction committed is up to the provider.

use std::sync::{Mutex, PoisonError};

use dashmap::DashSet;

pub trait LockProvider {
    /// Try to take the lock on `resource`. `false` means someone holds it.
    fn acquire(&self, resource: &str) -> bool;
    fn release(&self, resource: &str);
}

/// Process-local locks.
#[derive(Debug, Default)]
pub struct InMemoryLocks {
    held: DashSet<String>,
}

impl InMemoryLocks {
    pub fn new() -> Self {
        InMemoryLocks::default()
    }

    pub fn is_held(&self, resource: &str) -> bool {
        self.held.contains(resource)
    }
}

impl LockProvider for InMemoryLocks {
    fn acquire(&self, resource: &str) -> bool {
        self.held.insert(resource.to_string())
    }

    fn release(&self, resource: &str) {
        self.held.remove(resource);
    }
}

pub trait TransactionProvider {
    /// Open a transaction scope. An error message fails the transaction node.
    fn begin(&self, name: &str) -> Result<(), String>;
    fn commit(&self, name: &str);
    fn rollback(&self, name: &str);
}

/// Transactions that do nothing; the default when no store is involved.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransactions;

impl TransactionProvider for NoopTransactions {
    fn begin(&self, _name: &str) -> Result<(), String> {
        Ok(())
    }

    fn commit(&self, _name: &str) {}

    fn rollback(&self, _name: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEvent {
    Begin(String),
    Commit(String),
    Rollback(String),
}

/// Records every transaction call, in order.
#[derive(Debug, Default)]
pub struct JournalTransactions {
    events: Mutex<Vec<TxEvent>>,
}

impl JournalTransactions {
    pub fn new() -> Self {
        JournalTransactions::default()
    }

    pub fn events(&self) -> Vec<TxEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, event: TxEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl TransactionProvider for JournalTransactions {
    fn begin(&self, name: &str) -> Result<(), String> {
        self.push(TxEvent::Begin(name.to_string()));
        Ok(())
    }

    fn commit(&self, name: &str) {
        self.push(TxEvent::Commit(name.to_string()));
    }

    fn rollback(&self, name: &str) {
        self.push(TxEvent::Rollback(name.to_string()));
    }
}
