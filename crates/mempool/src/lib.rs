//! # Basalt Mempool
//!
//! The pending transaction pool: transactions admitted by the core but not
//! yet committed to any block. The pool is a plain data structure keyed and
//! deduplicated by transaction hash, preserving insertion order for block
//! templates. Admission policy (signatures, duplicates against the chain,
//! dry-runs) lives in the core; the pool's lock is never held across a VM
//! invocation.

#![warn(missing_docs)]
#![deny(unsafe_code)]

use std::collections::HashMap;

use basalt_types::{Transaction, TransactionsSet, H256};
use tracing::{debug, trace};

/// Why an insert was refused.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PoolError {
    /// The pool already holds this transaction.
    #[error("transaction {0} already pending")]
    Duplicate(H256),
    /// The pool is at capacity.
    #[error("pool is full ({capacity} transactions)")]
    Full {
        /// Configured capacity.
        capacity: usize,
    },
}

/// Default capacity of the pending pool.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// The set of admitted-but-uncommitted transactions.
#[derive(Debug)]
pub struct TransactionPool {
    by_hash: HashMap<H256, usize>,
    ordered: Vec<Option<Transaction>>,
    live: usize,
    capacity: usize,
}

impl Default for TransactionPool {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl TransactionPool {
    /// Creates an empty pool with the default capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty pool holding at most `capacity` transactions.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            by_hash: HashMap::new(),
            ordered: Vec::new(),
            live: 0,
            capacity,
        }
    }

    /// Inserts a transaction, keyed by its hash.
    pub fn insert(&mut self, tx: Transaction) -> Result<(), PoolError> {
        let hash = tx.hash();
        if self.by_hash.contains_key(&hash) {
            return Err(PoolError::Duplicate(hash));
        }
        if self.live >= self.capacity {
            return Err(PoolError::Full {
                capacity: self.capacity,
            });
        }
        trace!(hash = %hash, "transaction pooled");
        self.by_hash.insert(hash, self.ordered.len());
        self.ordered.push(Some(tx));
        self.live += 1;
        Ok(())
    }

    /// Membership check by transaction hash.
    pub fn contains(&self, hash: &H256) -> bool {
        self.by_hash.contains_key(hash)
    }

    /// Removes one transaction by hash. Returns whether it was present.
    pub fn remove(&mut self, hash: &H256) -> bool {
        match self.by_hash.remove(hash) {
            Some(slot) => {
                self.ordered[slot] = None;
                self.live -= 1;
                self.compact_if_sparse();
                true
            }
            None => false,
        }
    }

    /// Drops every transaction that appears in `committed`. Called after a
    /// block lands so the pool never overlaps the chain.
    pub fn remove_committed(&mut self, committed: &TransactionsSet) {
        let mut dropped = 0usize;
        for tx in committed {
            if self.remove(&tx.hash()) {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(dropped, remaining = self.live, "pool pruned after block");
        }
    }

    /// The pending transactions in insertion order.
    pub fn ordered(&self) -> TransactionsSet {
        self.ordered.iter().flatten().cloned().collect()
    }

    /// Number of pending transactions.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.by_hash.clear();
        self.ordered.clear();
        self.live = 0;
    }

    fn compact_if_sparse(&mut self) {
        // Rebuild the order vector once half of it is tombstones.
        if self.ordered.len() < 64 || self.live * 2 > self.ordered.len() {
            return;
        }
        let survivors: Vec<Transaction> = self.ordered.drain(..).flatten().collect();
        self.by_hash.clear();
        for tx in survivors {
            self.by_hash.insert(tx.hash(), self.ordered.len());
            self.ordered.push(Some(tx));
        }
    }
}
