//! 20-byte account addresses with Base58 text form.
//!
//! An address is derived deterministically from a secp256k1 public key by
//! hashing its compressed encoding with SHA-256 and keeping the first 20
//! bytes. The all-zero "null" address is not owned by any key; a transaction
//! sent to it creates a contract.

use crate::{Error, Result};
use basalt_codec::{Decode, Decoder, Encode, Encoder};
use basalt_crypto::ecdsa::PublicKey;
use basalt_crypto::sha256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Size of an address in bytes.
pub const ADDRESS_SIZE: usize = 20;

/// A 20-byte Basalt account address.
///
/// # Example
///
/// ```rust
/// use basalt_types::Address;
///
/// let null = Address::NULL;
/// assert!(null.is_null());
/// let round_trip: Address = null.to_string().parse().unwrap();
/// assert_eq!(round_trip, null);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    /// The null address. Marks contract creation when used as a recipient.
    pub const NULL: Self = Self([0u8; ADDRESS_SIZE]);

    /// Creates an address from a 20-byte array.
    #[inline]
    pub const fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates an address from a slice of exactly 20 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != ADDRESS_SIZE {
            return Err(Error::InvalidLength {
                expected: ADDRESS_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Derives the address owned by a public key.
    pub fn from_public_key(key: &PublicKey) -> Self {
        let digest = sha256(&key.to_compressed());
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes.copy_from_slice(&digest[..ADDRESS_SIZE]);
        Self(bytes)
    }

    /// Computes the address of a contract created by `self` at `nonce`.
    pub fn contract_address(&self, nonce: u64) -> Self {
        let mut enc = Encoder::with_capacity(ADDRESS_SIZE + 8);
        enc.write_raw(&self.0);
        enc.write_u64(nonce);
        let digest = sha256(&enc.into_bytes());
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes.copy_from_slice(&digest[..ADDRESS_SIZE]);
        Self(bytes)
    }

    /// Parses the Base58 text form.
    pub fn from_base58(s: &str) -> Result<Self> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| Error::InvalidAddress(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Returns the canonical Base58 text form.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    /// Returns the address as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the address as a fixed-size byte array.
    #[inline]
    pub const fn as_fixed_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// Checks whether this is the null address.
    #[inline]
    pub fn is_null(&self) -> bool {
        self == &Self::NULL
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_base58())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_base58(s)
    }
}

impl From<[u8; ADDRESS_SIZE]> for Address {
    fn from(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }
}

impl From<Address> for [u8; ADDRESS_SIZE] {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl From<&PublicKey> for Address {
    fn from(key: &PublicKey) -> Self {
        Self::from_public_key(key)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Encode for Address {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_raw(&self.0);
    }
}

impl Decode for Address {
    fn decode(dec: &mut Decoder<'_>) -> basalt_codec::Result<Self> {
        let raw = dec.read_raw(ADDRESS_SIZE)?;
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes.copy_from_slice(raw);
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base58(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_crypto::ecdsa::PrivateKey;

    #[test]
    fn base58_round_trip() {
        let addr = Address::new([0x42; 20]);
        let parsed: Address = addr.to_base58().parse().unwrap();
        assert_eq!(addr, parsed);
    }

    #[test]
    fn null_address_is_null() {
        assert!(Address::NULL.is_null());
        assert!(!Address::new([1; 20]).is_null());
    }

    #[test]
    fn derivation_is_deterministic() {
        let key = PrivateKey::random();
        let a = Address::from_public_key(&key.public_key());
        let b = Address::from_public_key(&key.public_key());
        assert_eq!(a, b);
        assert!(!a.is_null());
    }

    #[test]
    fn distinct_keys_give_distinct_addresses() {
        let a = Address::from_public_key(&PrivateKey::random().public_key());
        let b = Address::from_public_key(&PrivateKey::random().public_key());
        assert_ne!(a, b);
    }

    #[test]
    fn contract_address_depends_on_nonce() {
        let sender = Address::new([7; 20]);
        assert_ne!(sender.contract_address(0), sender.contract_address(1));
        assert_eq!(sender.contract_address(3), sender.contract_address(3));
    }

    #[test]
    fn codec_round_trip() {
        let addr = Address::new([0xab; 20]);
        let bytes = basalt_codec::to_bytes(&addr);
        assert_eq!(bytes.len(), ADDRESS_SIZE);
        assert_eq!(basalt_codec::from_bytes::<Address>(&bytes).unwrap(), addr);
    }

    #[test]
    fn invalid_base58_is_rejected() {
        assert!(Address::from_base58("0OIl").is_err());
        // Valid Base58 of the wrong length.
        assert!(Address::from_base58("abc").is_err());
    }
}
