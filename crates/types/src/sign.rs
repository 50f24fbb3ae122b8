//! Detached signatures carrying the signer's public key.

use crate::{Address, Error, Result, H256};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use basalt_codec::{Decode, Decoder, Encode, Encoder};
use basalt_crypto::ecdsa::{CompactSignature, PrivateKey, PublicKey};
use serde::{Deserialize, Serialize};

/// A signature over the canonical payload of a transaction, block field or
/// view call.
///
/// `None` is valid only on inert template values; everything entering the
/// pending pool or a block must carry a `Signed` value whose public key
/// derives the claimed author address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Sign {
    /// No signature attached.
    #[default]
    None,
    /// A signature and the public key that produced it.
    Signed {
        /// The signer's public key.
        public_key: PublicKey,
        /// Compact ECDSA signature over the SHA-256 payload digest.
        signature: CompactSignature,
    },
}

impl Sign {
    /// Produces a signature over `digest` with `key`.
    pub fn create(key: &PrivateKey, digest: &H256) -> Result<Self> {
        let signature = key.sign_prehash(digest.as_fixed_bytes())?;
        Ok(Self::Signed {
            public_key: key.public_key(),
            signature,
        })
    }

    /// Checks whether no signature is attached.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Verifies the signature over `digest` and that the embedded key owns
    /// `author`. A missing signature never verifies.
    pub fn verify(&self, author: &Address, digest: &H256) -> bool {
        match self {
            Self::None => false,
            Self::Signed {
                public_key,
                signature,
            } => {
                Address::from_public_key(public_key) == *author
                    && public_key.verify_prehash(digest.as_fixed_bytes(), signature)
            }
        }
    }

    /// Encodes the signature to Base64 for transport surfaces.
    pub fn to_base64(&self) -> String {
        BASE64.encode(basalt_codec::to_bytes(self))
    }

    /// Decodes a signature from its Base64 transport form.
    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(s)
            .map_err(|e| Error::InvalidTransaction(format!("bad signature base64: {e}")))?;
        Ok(basalt_codec::from_bytes(&bytes)?)
    }
}

impl Encode for Sign {
    fn encode(&self, enc: &mut Encoder) {
        match self {
            Self::None => enc.write_bool(false),
            Self::Signed {
                public_key,
                signature,
            } => {
                enc.write_bool(true);
                enc.write(public_key);
                enc.write(signature);
            }
        }
    }
}

impl Decode for Sign {
    fn decode(dec: &mut Decoder<'_>) -> basalt_codec::Result<Self> {
        if dec.read_bool()? {
            Ok(Self::Signed {
                public_key: dec.read()?,
                signature: dec.read()?,
            })
        } else {
            Ok(Self::None)
        }
    }
}
