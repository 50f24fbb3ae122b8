//! # Basalt Types
//!
//! Core type definitions for the Basalt blockchain.
//!
//! This crate provides the fundamental types used throughout Basalt:
//! - [`Address`] - 20-byte account identifiers with Base58 text form
//! - [`H256`] - 32-byte SHA-256 hashes
//! - [`Balance`] - unsigned arbitrary-precision account balance
//! - [`Sign`] - detached signatures carrying the signer's public key
//! - [`Transaction`] and [`TransactionBuilder`] - signed value transfers and
//!   contract invocations
//! - [`Block`] - hash-linked containers of transactions
//! - [`Account`] - client and contract account state
//!
//! Every type carries exactly one canonical byte encoding through
//! [`basalt_codec`]; that encoding is what gets hashed, signed, persisted and
//! framed on the wire.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod account;
pub mod address;
pub mod balance;
pub mod block;
pub mod hash;
pub mod sign;
pub mod status;
pub mod transaction;

pub use account::Account;
pub use address::Address;
pub use balance::Balance;
pub use block::{Block, BlockDepth};
pub use hash::H256;
pub use sign::Sign;
pub use status::{ActionType, StatusCode, TransactionStatus};
pub use transaction::{
    ContractInitData, Transaction, TransactionBuilder, TransactionsSet, ViewCall,
};

use std::time::{SystemTime, UNIX_EPOCH};

/// Result type alias for Basalt type operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when constructing or parsing Basalt types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid length for a fixed-size type.
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Invalid address text form.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid hash text form.
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    /// Invalid balance text form or arithmetic underflow.
    #[error("invalid balance: {0}")]
    InvalidBalance(String),

    /// A transaction violated a structural constraint.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// A builder was finalized with a required field missing.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Canonical codec failure.
    #[error(transparent)]
    Codec(#[from] basalt_codec::Error),

    /// Cryptographic failure.
    #[error(transparent)]
    Crypto(#[from] basalt_crypto::CryptoError),
}

/// Current wall-clock time as unix seconds.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
