//! The node identity key.
//!
//! The key lives as a hex file under the configured keys directory and is
//! generated on first start. Everything beyond loading and signing (key
//! export formats, client wallets) is external tooling.

use std::path::Path;

use basalt_crypto::ecdsa::PrivateKey;
use basalt_types::Address;
use tracing::info;

use crate::{NodeError, Result};

const KEY_FILE: &str = "node.key";

/// Holder of the node's private key and derived address.
pub struct KeyVault {
    key: PrivateKey,
    address: Address,
}

impl KeyVault {
    /// Loads the identity key from `directory`, generating one on first
    /// start.
    pub fn open(directory: &Path) -> Result<Self> {
        std::fs::create_dir_all(directory)
            .map_err(|e| NodeError::Vault(format!("cannot create {}: {e}", directory.display())))?;
        let path = directory.join(KEY_FILE);

        let key = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| NodeError::Vault(format!("cannot read {}: {e}", path.display())))?;
            let bytes = hex::decode(content.trim())
                .map_err(|e| NodeError::Vault(format!("malformed key file: {e}")))?;
            PrivateKey::from_bytes(&bytes)
                .map_err(|e| NodeError::Vault(format!("invalid key material: {e}")))?
        } else {
            let key = PrivateKey::random();
            std::fs::write(&path, hex::encode(key.to_bytes()))
                .map_err(|e| NodeError::Vault(format!("cannot write {}: {e}", path.display())))?;
            info!(path = %path.display(), "generated node identity key");
            key
        };

        let address = Address::from_public_key(&key.public_key());
        info!(%address, "node identity loaded");
        Ok(Self { key, address })
    }

    /// The node's signing key.
    pub fn key(&self) -> &PrivateKey {
        &self.key
    }

    /// The address derived from the node's public key.
    pub fn address(&self) -> &Address {
        &self.address
    }
}
