//! # Basalt Node Engine
//!
//! The engine that ties the data model together:
//!
//! - [`Core`] - transaction execution, block validation and application,
//!   the pending pool, block templates, view calls and observers
//! - [`host::EthBridge`] - the adapter the contract interpreter talks to,
//!   mapping host operations one-to-one onto the state manager
//! - [`observer::Observable`] - the typed publish primitive behind
//!   block-added and pending-transaction notifications
//! - [`vault::KeyVault`] - the node identity key
//!
//! All core operations are synchronous: they complete or fail under their
//! locks and never suspend. Networking and the RPC surface live in their own
//! crates and call in through [`Core`].

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod core;
pub mod host;
pub mod logging;
pub mod node;
pub mod observer;
pub mod vault;

pub use crate::core::{Core, API_VERSION};
pub use crate::node::Node;
pub use observer::{Observable, Subscription};
pub use vault::KeyVault;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, NodeError>;

/// Errors surfaced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Malformed input, bad signature or duplicate. The caller's fault,
    /// not a node fault.
    #[error("validation error: {0}")]
    Validation(String),

    /// The requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A view call reverted; the payload is carried Base64-encoded.
    #[error("view call reverted: {0}")]
    ViewReverted(String),

    /// A view call failed in the interpreter.
    #[error("view call failed")]
    ViewFailed,

    /// The storage layer failed or its invariants are broken.
    #[error(transparent)]
    Storage(#[from] basalt_storage::StorageError),

    /// Identity key handling failed.
    #[error("key vault error: {0}")]
    Vault(String),
}
