//! # Basalt Storage Layer
//!
//! This crate provides the storage infrastructure of the node:
//!
//! - **Key-value interface**: the [`KeyValueStore`] trait the on-disk engine
//!   plugs into, with an in-memory implementation for tests and development
//! - **State manager**: account records, contract storage and code with
//!   nested snapshot/commit/rollback boundaries
//! - **Block store**: the block index (hash, depth and transaction maps)
//!   with the cached top-block pointer
//!
//! No partial mutation ever escapes a failed execution: everything between a
//! [`state::StateManager::checkpoint`] and its rollback is undone in one
//! step.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod chain;
pub mod db;
pub mod state;

pub use chain::{BlockStore, LinkOutcome};
pub use db::{namespace, KeyValueStore, MemoryStore};
pub use state::{Checkpoint, StateManager, StorageDiff};

use basalt_types::Address;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage error types.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backing key-value engine failed.
    #[error("backend error: {0}")]
    Backend(String),

    /// A persisted value failed to decode.
    #[error(transparent)]
    Codec(#[from] basalt_codec::Error),

    /// The persisted chain violates its own invariants. Fatal at load.
    #[error("store inconsistency: {0}")]
    Inconsistency(String),

    /// A debit was attempted beyond the available balance.
    #[error("insufficient funds on {0}")]
    InsufficientFunds(Address),

    /// An account was created over an existing one.
    #[error("account already exists: {0}")]
    AlreadyExists(Address),

    /// An operation needed a contract account but found none.
    #[error("not a contract: {0}")]
    NotAContract(Address),

    /// A snapshot handle did not match any open checkpoint.
    #[error("unknown checkpoint: {0}")]
    UnknownCheckpoint(u64),
}
