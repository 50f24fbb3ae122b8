//! Key-value interface to the persistence engine.
//!
//! The on-disk engine is external to the node core; it plugs in behind
//! [`KeyValueStore`]. Keys are partitioned into namespaces, one per
//! persisted map, and all values use the canonical codec.

use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::Result;

/// Key layout of the persisted namespaces.
pub mod namespace {
    use basalt_types::{Address, BlockDepth, H256};

    /// `blocks/<hash>` - block records.
    pub fn block(hash: &H256) -> Vec<u8> {
        [b"blocks/".as_slice(), hash.as_bytes()].concat()
    }

    /// `depth/<u64be>` - depth to block hash.
    pub fn depth(depth: BlockDepth) -> Vec<u8> {
        [b"depth/".as_slice(), &depth.to_be_bytes()].concat()
    }

    /// `txs/<hash>` - transaction hash to location.
    pub fn tx(hash: &H256) -> Vec<u8> {
        [b"txs/".as_slice(), hash.as_bytes()].concat()
    }

    /// `accounts/<addr>` - account records.
    pub fn account(addr: &Address) -> Vec<u8> {
        [b"accounts/".as_slice(), addr.as_bytes()].concat()
    }

    /// Prefix of the account namespace.
    pub const ACCOUNTS_PREFIX: &[u8] = b"accounts/";

    /// `storage/<addr>/<key>` - contract storage slots.
    pub fn storage(addr: &Address, key: &H256) -> Vec<u8> {
        [
            b"storage/".as_slice(),
            addr.as_bytes(),
            b"/",
            key.as_bytes(),
        ]
        .concat()
    }

    /// Prefix of one contract's storage slots.
    pub fn storage_prefix(addr: &Address) -> Vec<u8> {
        [b"storage/".as_slice(), addr.as_bytes(), b"/"].concat()
    }

    /// Prefix of the whole storage namespace.
    pub const STORAGE_PREFIX: &[u8] = b"storage/";

    /// `meta/top` - hash of the current top block.
    pub const META_TOP: &[u8] = b"meta/top";
}

/// The interface the persistence engine implements.
///
/// Implementations must be safe to share across threads; the node performs
/// its own higher-level locking.
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Writes a value, replacing any previous one.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Removes a key. Removing an absent key is not an error.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Checks key presence.
    fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Returns all entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// An in-memory [`KeyValueStore`] for tests and development.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .entries
            .read()
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let store = MemoryStore::new();
        assert!(store.get(b"k").unwrap().is_none());

        store.put(b"k", b"v").unwrap();
        assert_eq!(store.get(b"k").unwrap().unwrap(), b"v");
        assert!(store.exists(b"k").unwrap());

        store.delete(b"k").unwrap();
        assert!(!store.exists(b"k").unwrap());
    }

    #[test]
    fn scan_prefix_is_bounded() {
        let store = MemoryStore::new();
        store.put(b"a/1", b"1").unwrap();
        store.put(b"a/2", b"2").unwrap();
        store.put(b"b/1", b"3").unwrap();

        let hits = store.scan_prefix(b"a/").unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|(k, _)| k.starts_with(b"a/")));
    }

    #[test]
    fn namespaces_do_not_collide() {
        use basalt_types::{Address, H256};
        let hash = H256::sha256(b"h");
        let addr = Address::new([1; 20]);
        let keys = [
            namespace::block(&hash),
            namespace::depth(1),
            namespace::tx(&hash),
            namespace::account(&addr),
            namespace::storage(&addr, &hash),
            namespace::META_TOP.to_vec(),
        ];
        for (i, a) in keys.iter().enumerate() {
            for (j, b) in keys.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b);
                }
            }
        }
    }
}
