//! 32-byte SHA-256 hash type.

use crate::{Error, Result};
use basalt_codec::{Decode, Decoder, Encode, Encoder};
use basalt_crypto::sha256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Size of a hash in bytes.
pub const HASH_SIZE: usize = 32;

/// A 32-byte SHA-256 digest.
///
/// The canonical text form is lowercase hex without a prefix. The all-zero
/// value [`H256::NIL`] marks "no hash" (the parent of genesis).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct H256([u8; HASH_SIZE]);

impl H256 {
    /// The all-zero hash.
    pub const NIL: Self = Self([0u8; HASH_SIZE]);

    /// Creates a hash from a 32-byte array.
    #[inline]
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a hash from a slice of exactly 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != HASH_SIZE {
            return Err(Error::InvalidLength {
                expected: HASH_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Hashes raw bytes with SHA-256.
    pub fn sha256(data: &[u8]) -> Self {
        Self(sha256(data))
    }

    /// Hashes the canonical encoding of a value.
    pub fn of<T: Encode + ?Sized>(value: &T) -> Self {
        Self::sha256(&basalt_codec::to_bytes(value))
    }

    /// Parses the lowercase hex text form.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidHash(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Returns the hash as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the hash as a fixed-size byte array.
    #[inline]
    pub const fn as_fixed_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Checks whether this is the all-zero hash.
    #[inline]
    pub fn is_nil(&self) -> bool {
        self == &Self::NIL
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H256({})", hex::encode(self.0))
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for H256 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<[u8; HASH_SIZE]> for H256 {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

impl From<H256> for [u8; HASH_SIZE] {
    fn from(hash: H256) -> Self {
        hash.0
    }
}

impl AsRef<[u8]> for H256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Encode for H256 {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_raw(&self.0);
    }
}

impl Decode for H256 {
    fn decode(dec: &mut Decoder<'_>) -> basalt_codec::Result<Self> {
        let raw = dec.read_raw(HASH_SIZE)?;
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(raw);
        Ok(Self(bytes))
    }
}

impl Serialize for H256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for H256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let hash = H256::sha256(b"basalt");
        let parsed: H256 = hash.to_string().parse().unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn nil_is_all_zero() {
        assert!(H256::NIL.is_nil());
        assert_eq!(H256::NIL.to_string(), "0".repeat(64));
    }

    #[test]
    fn hashing_is_deterministic() {
        assert_eq!(H256::sha256(b"x"), H256::sha256(b"x"));
        assert_ne!(H256::sha256(b"x"), H256::sha256(b"y"));
    }

    #[test]
    fn of_hashes_canonical_encoding() {
        let value = 1234u64;
        assert_eq!(
            H256::of(&value),
            H256::sha256(&basalt_codec::to_bytes(&value))
        );
    }

    #[test]
    fn codec_round_trip() {
        let hash = H256::sha256(b"payload");
        let bytes = basalt_codec::to_bytes(&hash);
        assert_eq!(bytes.len(), HASH_SIZE);
        assert_eq!(basalt_codec::from_bytes::<H256>(&bytes).unwrap(), hash);
    }

    #[test]
    fn wrong_length_hex_is_rejected() {
        assert!(H256::from_hex("abcd").is_err());
    }
}
