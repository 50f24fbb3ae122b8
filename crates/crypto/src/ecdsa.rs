//! secp256k1 keypairs and compact signatures.
//!
//! Basalt signs the SHA-256 digest of a value's canonical encoding. The
//! signature travels together with the signer's compressed public key, so
//! verification never needs key recovery: the verifier checks the signature
//! against the carried key and separately checks that the key derives the
//! claimed author address.

use crate::{sha256, CryptoError, Result};
use basalt_codec::{Decode, Decoder, Encode, Encoder};
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature as K256Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// Byte length of a compressed SEC1 public key.
pub const PUBLIC_KEY_SIZE: usize = 33;

/// Byte length of a compact ECDSA signature (r || s).
pub const SIGNATURE_SIZE: usize = 64;

/// A secp256k1 private key.
#[derive(Clone)]
pub struct PrivateKey {
    inner: SigningKey,
}

impl PrivateKey {
    /// Generates a random private key from the OS entropy source.
    pub fn random() -> Self {
        Self {
            inner: SigningKey::random(&mut OsRng),
        }
    }

    /// Restores a private key from its 32 raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let inner = SigningKey::from_slice(bytes)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Returns the 32 raw key bytes. Handle with care.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes().into()
    }

    /// Derives the matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: *self.inner.verifying_key(),
        }
    }

    /// Signs a 32-byte digest, producing a compact signature.
    pub fn sign_prehash(&self, digest: &[u8; 32]) -> Result<CompactSignature> {
        let sig: K256Signature = self
            .inner
            .sign_prehash(digest)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        let mut out = [0u8; SIGNATURE_SIZE];
        out.copy_from_slice(&sig.to_bytes());
        Ok(CompactSignature(out))
    }

    /// Hashes `data` with SHA-256 and signs the digest.
    pub fn sign(&self, data: &[u8]) -> Result<CompactSignature> {
        self.sign_prehash(&sha256(data))
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public_key", &self.public_key())
            .finish()
    }
}

/// A secp256k1 public key, kept in compressed SEC1 form.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl std::hash::Hash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_compressed().hash(state);
    }
}

impl PublicKey {
    /// Restores a public key from SEC1 bytes (compressed or uncompressed).
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self> {
        let inner = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Returns the compressed 33-byte SEC1 encoding.
    pub fn to_compressed(&self) -> [u8; PUBLIC_KEY_SIZE] {
        let point = self.inner.to_encoded_point(true);
        let mut out = [0u8; PUBLIC_KEY_SIZE];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// Verifies a compact signature over a 32-byte digest.
    pub fn verify_prehash(&self, digest: &[u8; 32], signature: &CompactSignature) -> bool {
        match K256Signature::from_slice(&signature.0) {
            Ok(sig) => self.inner.verify_prehash(digest, &sig).is_ok(),
            Err(_) => false,
        }
    }

    /// Hashes `data` with SHA-256 and verifies the signature over the digest.
    pub fn verify(&self, data: &[u8], signature: &CompactSignature) -> bool {
        self.verify_prehash(&sha256(data), signature)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.to_compressed()))
    }
}

impl Encode for PublicKey {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_raw(&self.to_compressed());
    }
}

impl Decode for PublicKey {
    fn decode(dec: &mut Decoder<'_>) -> basalt_codec::Result<Self> {
        let raw = dec.read_raw(PUBLIC_KEY_SIZE)?;
        Self::from_sec1_bytes(raw).map_err(|e| basalt_codec::Error::InvalidValue {
            type_name: "PublicKey",
            reason: e.to_string(),
        })
    }
}

impl Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.to_compressed()))
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        Self::from_sec1_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// A 64-byte compact ECDSA signature (r || s).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompactSignature(pub [u8; SIGNATURE_SIZE]);

impl CompactSignature {
    /// Restores a signature from exactly 64 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SIGNATURE_SIZE {
            return Err(CryptoError::InvalidLength {
                expected: SIGNATURE_SIZE,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; SIGNATURE_SIZE];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    /// Returns the raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for CompactSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CompactSignature({})", hex::encode(self.0))
    }
}

impl Encode for CompactSignature {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_raw(&self.0);
    }
}

impl Decode for CompactSignature {
    fn decode(dec: &mut Decoder<'_>) -> basalt_codec::Result<Self> {
        let raw = dec.read_raw(SIGNATURE_SIZE)?;
        let mut out = [0u8; SIGNATURE_SIZE];
        out.copy_from_slice(raw);
        Ok(Self(out))
    }
}

impl Serialize for CompactSignature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for CompactSignature {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        Self::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let key = PrivateKey::random();
        let digest = sha256(b"message");
        let sig = key.sign_prehash(&digest).unwrap();
        assert!(key.public_key().verify_prehash(&digest, &sig));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let key = PrivateKey::random();
        let other = PrivateKey::random();
        let digest = sha256(b"message");
        let sig = key.sign_prehash(&digest).unwrap();
        assert!(!other.public_key().verify_prehash(&digest, &sig));
    }

    #[test]
    fn wrong_digest_fails_verification() {
        let key = PrivateKey::random();
        let sig = key.sign_prehash(&sha256(b"message")).unwrap();
        assert!(!key.public_key().verify_prehash(&sha256(b"other"), &sig));
    }

    #[test]
    fn private_key_round_trip() {
        let key = PrivateKey::random();
        let restored = PrivateKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(
            key.public_key().to_compressed(),
            restored.public_key().to_compressed()
        );
    }

    #[test]
    fn public_key_codec_round_trip() {
        let key = PrivateKey::random().public_key();
        let bytes = basalt_codec::to_bytes(&key);
        assert_eq!(bytes.len(), PUBLIC_KEY_SIZE);
        let decoded: PublicKey = basalt_codec::from_bytes(&bytes).unwrap();
        assert_eq!(key, decoded);
    }

    #[test]
    fn signature_from_slice_checks_length() {
        assert!(CompactSignature::from_slice(&[0u8; 63]).is_err());
    }
}
