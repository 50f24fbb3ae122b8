//! # Basalt Crypto
//!
//! Cryptographic primitives used across the node:
//!
//! - [`sha256`] / [`sha256_concat`] - the hash function behind every block,
//!   transaction and address in Basalt
//! - [`ecdsa`] - secp256k1 keypairs and compact signatures
//!
//! ## Example
//!
//! ```rust
//! use basalt_crypto::ecdsa::PrivateKey;
//! use basalt_crypto::sha256;
//!
//! let key = PrivateKey::random();
//! let digest = sha256(b"payload");
//! let sig = key.sign_prehash(&digest).unwrap();
//! assert!(key.public_key().verify_prehash(&digest, &sig));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod ecdsa;

use sha2::{Digest, Sha256};

/// Result type alias for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors produced by key handling and signing.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Private key bytes were not a valid scalar.
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Public key bytes were not a valid curve point.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Signature bytes were malformed.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// A fixed-size input had the wrong length.
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected byte count.
        expected: usize,
        /// Actual byte count.
        actual: usize,
    },

    /// Hex decoding failed.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Computes the SHA-256 digest of `data`.
#[inline]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes the SHA-256 digest of several slices fed in order.
#[inline]
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}
