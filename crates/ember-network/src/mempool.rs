//! The in-memory, non-durable transaction pool.
//!
//! A node restart drops everything here; nothing about the mempool is
//! written to the store. Keyed by transaction id so duplicate relays of
//! the same transaction are harmless.

use std::collections::HashMap;

use ember_core::types::{Hash256, Transaction};
use parking_lot::RwLock;

#[derive(Default)]
pub struct Mempool {
    transactions: RwLock<HashMap<Hash256, Transaction>>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tx: Transaction) {
        self.transactions.write().insert(tx.id, tx);
    }

    pub fn contains(&self, id: &Hash256) -> bool {
        self.transactions.read().contains_key(id)
    }

    pub fn get(&self, id: &Hash256) -> Option<Transaction> {
        self.transactions.read().get(id).cloned()
    }

    pub fn remove(&self, id: &Hash256) {
        self.transactions.write().remove(id);
    }

    pub fn len(&self) -> usize {
        self.transactions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A snapshot of every pooled transaction, in no particular order.
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.transactions.read().values().cloned().collect()
    }
}
