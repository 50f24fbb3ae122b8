//! Account state management with nested snapshots.
//!
//! The state manager owns every account record, contract storage slot and
//! code blob. Mutation happens between an explicit [`StateManager::checkpoint`]
//! and a matching commit or rollback; rolling back restores the state of the
//! checkpoint bit for bit, however deep the mutations went.

use std::collections::HashMap;

use basalt_types::{Account, Address, Balance, H256};
use bytes::Bytes;
use tracing::{debug, trace};

use crate::db::{namespace, KeyValueStore};
use crate::{Result, StorageError};

/// Handle to one open snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(u64);

/// Effect of a storage slot write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageDiff {
    /// The slot already held this value.
    Unchanged,
    /// A non-zero slot now holds a different non-zero value.
    Modified,
    /// A zero slot became non-zero.
    Added,
    /// A non-zero slot was set to zero.
    Deleted,
}

#[derive(Debug, Clone)]
struct Snapshot {
    id: u64,
    accounts: HashMap<Address, Account>,
    storage: HashMap<(Address, H256), H256>,
}

/// Accounts, contract storage and code, with snapshot boundaries.
///
/// The manager has no interior locking; the core serializes access through
/// its state lock. Checkpoints nest: a rollback undoes only the work since
/// its own checkpoint, a commit merges that work into the enclosing scope.
#[derive(Debug, Default)]
pub struct StateManager {
    accounts: HashMap<Address, Account>,
    storage: HashMap<(Address, H256), H256>,
    snapshots: Vec<Snapshot>,
    next_checkpoint: u64,
}

impl StateManager {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Looks up an account record.
    pub fn get_account(&self, addr: &Address) -> Option<&Account> {
        self.accounts.get(addr)
    }

    /// Whether an account exists.
    pub fn exists(&self, addr: &Address) -> bool {
        self.accounts.contains_key(addr)
    }

    /// Whether an account exists and is a contract.
    pub fn is_contract(&self, addr: &Address) -> bool {
        self.accounts.get(addr).is_some_and(Account::is_contract)
    }

    /// Creates an empty client account.
    pub fn create_client(&mut self, addr: Address) -> Result<()> {
        if self.accounts.contains_key(&addr) {
            return Err(StorageError::AlreadyExists(addr));
        }
        trace!(address = %addr, "creating client account");
        self.accounts.insert(addr, Account::new_client());
        Ok(())
    }

    /// Creates a contract account holding `code` and `abi`.
    pub fn create_contract(
        &mut self,
        addr: Address,
        code: impl Into<Bytes>,
        abi: impl Into<Bytes>,
    ) -> Result<()> {
        if self.accounts.contains_key(&addr) {
            return Err(StorageError::AlreadyExists(addr));
        }
        trace!(address = %addr, "creating contract account");
        self.accounts.insert(addr, Account::new_contract(code, abi));
        Ok(())
    }

    /// Replaces the runtime code of a contract. Used once at deployment,
    /// after the init code returned the runtime blob.
    pub fn set_code(&mut self, addr: &Address, new_code: impl Into<Bytes>) -> Result<()> {
        match self.accounts.get_mut(addr) {
            Some(Account::Contract { code, .. }) => {
                *code = new_code.into();
                Ok(())
            }
            _ => Err(StorageError::NotAContract(*addr)),
        }
    }

    /// The runtime code of a contract.
    pub fn code(&self, addr: &Address) -> Option<Bytes> {
        match self.accounts.get(addr) {
            Some(Account::Contract { code, .. }) => Some(code.clone()),
            _ => None,
        }
    }

    /// The ABI blob of a contract.
    pub fn abi(&self, addr: &Address) -> Option<Bytes> {
        match self.accounts.get(addr) {
            Some(Account::Contract { abi, .. }) => Some(abi.clone()),
            _ => None,
        }
    }

    // =========================================================================
    // Balances and nonces
    // =========================================================================

    /// The balance of an account; absent accounts read as zero.
    pub fn balance(&self, addr: &Address) -> Balance {
        self.accounts
            .get(addr)
            .map(|a| a.balance().clone())
            .unwrap_or_else(Balance::zero)
    }

    /// Credits an account, creating a client record on first credit.
    pub fn add_balance(&mut self, addr: &Address, amount: &Balance) {
        let account = self
            .accounts
            .entry(*addr)
            .or_insert_with(Account::new_client);
        let updated = account.balance().clone() + amount;
        account.set_balance(updated);
    }

    /// Debits an account; underflow is [`StorageError::InsufficientFunds`].
    pub fn sub_balance(&mut self, addr: &Address, amount: &Balance) -> Result<()> {
        let account = self
            .accounts
            .get_mut(addr)
            .ok_or(StorageError::InsufficientFunds(*addr))?;
        let updated = account
            .balance()
            .checked_sub(amount)
            .ok_or(StorageError::InsufficientFunds(*addr))?;
        account.set_balance(updated);
        Ok(())
    }

    /// Moves `amount` between two accounts atomically: either both sides
    /// update or neither does.
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: &Balance) -> Result<()> {
        self.sub_balance(from, amount)?;
        self.add_balance(to, amount);
        Ok(())
    }

    /// The nonce of a client account; contracts and absent accounts read 0.
    pub fn nonce(&self, addr: &Address) -> u64 {
        match self.accounts.get(addr) {
            Some(Account::Client { nonce, .. }) => *nonce,
            _ => 0,
        }
    }

    /// Increments the nonce of a client account.
    pub fn bump_nonce(&mut self, addr: &Address) {
        if let Some(Account::Client { nonce, .. }) = self.accounts.get_mut(addr) {
            *nonce += 1;
        }
    }

    /// Appends a transaction hash to a client account's history. Contract
    /// accounts keep no history.
    pub fn append_tx_hash(&mut self, addr: &Address, hash: H256) {
        if let Some(Account::Client { tx_hashes, .. }) = self.accounts.get_mut(addr) {
            tx_hashes.push(hash);
        }
    }

    // =========================================================================
    // Contract storage
    // =========================================================================

    /// Reads a storage slot; unwritten slots read as zero.
    pub fn get_storage(&self, addr: &Address, key: &H256) -> H256 {
        self.storage
            .get(&(*addr, *key))
            .copied()
            .unwrap_or(H256::NIL)
    }

    /// Writes a storage slot, reporting the effect.
    pub fn set_storage(&mut self, addr: &Address, key: &H256, value: &H256) -> StorageDiff {
        let slot = (*addr, *key);
        let previous = self.storage.get(&slot).copied().unwrap_or(H256::NIL);

        let diff = match (previous.is_nil(), value.is_nil()) {
            _ if previous == *value => StorageDiff::Unchanged,
            (true, false) => StorageDiff::Added,
            (false, true) => StorageDiff::Deleted,
            _ => StorageDiff::Modified,
        };

        if value.is_nil() {
            self.storage.remove(&slot);
        } else {
            self.storage.insert(slot, *value);
        }
        trace!(address = %addr, key = %key, ?diff, "storage write");
        diff
    }

    /// All storage slots of one contract, for queries.
    pub fn storage_of(&self, addr: &Address) -> Vec<(H256, H256)> {
        let mut slots: Vec<(H256, H256)> = self
            .storage
            .iter()
            .filter(|((owner, _), _)| owner == addr)
            .map(|((_, key), value)| (*key, *value))
            .collect();
        slots.sort();
        slots
    }

    /// Destroys a contract: moves its remaining balance to `beneficiary` and
    /// drops the record together with its storage.
    pub fn destroy_contract(&mut self, addr: &Address, beneficiary: &Address) -> Result<()> {
        let account = self
            .accounts
            .get(addr)
            .filter(|a| a.is_contract())
            .ok_or(StorageError::NotAContract(*addr))?;
        let remaining = account.balance().clone();

        self.accounts.remove(addr);
        self.storage.retain(|(owner, _), _| owner != addr);
        // A contract naming itself as beneficiary burns the balance.
        if !remaining.is_zero() && beneficiary != addr {
            self.add_balance(beneficiary, &remaining);
        }
        debug!(address = %addr, beneficiary = %beneficiary, "contract destroyed");
        Ok(())
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Opens a snapshot and returns its handle.
    pub fn checkpoint(&mut self) -> Checkpoint {
        self.next_checkpoint += 1;
        let id = self.next_checkpoint;
        self.snapshots.push(Snapshot {
            id,
            accounts: self.accounts.clone(),
            storage: self.storage.clone(),
        });
        trace!(checkpoint = id, "state checkpoint opened");
        Checkpoint(id)
    }

    /// Merges everything since `cp` into the enclosing scope.
    pub fn commit(&mut self, cp: Checkpoint) -> Result<()> {
        let idx = self
            .snapshots
            .iter()
            .position(|s| s.id == cp.0)
            .ok_or(StorageError::UnknownCheckpoint(cp.0))?;
        // The current maps already carry the changes; dropping the saved
        // copy hands them to the enclosing checkpoint.
        self.snapshots.remove(idx);
        trace!(checkpoint = cp.0, "state checkpoint committed");
        Ok(())
    }

    /// Restores the state exactly as it was when `cp` was opened, discarding
    /// any checkpoints nested inside it.
    pub fn rollback(&mut self, cp: Checkpoint) -> Result<()> {
        let idx = self
            .snapshots
            .iter()
            .position(|s| s.id == cp.0)
            .ok_or(StorageError::UnknownCheckpoint(cp.0))?;
        let snapshot = self.snapshots.swap_remove(idx);
        self.snapshots.truncate(idx);
        self.accounts = snapshot.accounts;
        self.storage = snapshot.storage;
        debug!(checkpoint = cp.0, "state rolled back");
        Ok(())
    }

    /// Number of open checkpoints.
    pub fn open_checkpoints(&self) -> usize {
        self.snapshots.len()
    }

    /// An independent copy of the current state with no open checkpoints.
    /// View calls execute against forks and throw them away.
    pub fn fork(&self) -> Self {
        Self {
            accounts: self.accounts.clone(),
            storage: self.storage.clone(),
            snapshots: Vec::new(),
            next_checkpoint: 0,
        }
    }

    /// Sum of every account balance. Test hook for conservation checks.
    pub fn total_supply(&self) -> Balance {
        self.accounts.values().map(|a| a.balance().clone()).sum()
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Writes the full account and storage namespaces to the engine,
    /// removing entries that no longer exist in memory (destroyed contracts,
    /// zeroed slots).
    pub fn flush(&self, store: &dyn KeyValueStore) -> Result<()> {
        for (key, _) in store.scan_prefix(namespace::ACCOUNTS_PREFIX)? {
            let raw = &key[namespace::ACCOUNTS_PREFIX.len()..];
            let live = Address::from_slice(raw)
                .map(|addr| self.accounts.contains_key(&addr))
                .unwrap_or(false);
            if !live {
                store.delete(&key)?;
            }
        }
        for (key, _) in store.scan_prefix(namespace::STORAGE_PREFIX)? {
            let raw = &key[namespace::STORAGE_PREFIX.len()..];
            let live = raw.len() == 20 + 1 + 32
                && raw[20] == b'/'
                && match (Address::from_slice(&raw[..20]), H256::from_slice(&raw[21..])) {
                    (Ok(addr), Ok(slot)) => self.storage.contains_key(&(addr, slot)),
                    _ => false,
                };
            if !live {
                store.delete(&key)?;
            }
        }

        for (addr, account) in &self.accounts {
            store.put(
                &namespace::account(addr),
                &basalt_codec::to_bytes(account),
            )?;
        }
        for ((addr, key), value) in &self.storage {
            store.put(
                &namespace::storage(addr, key),
                &basalt_codec::to_bytes(value),
            )?;
        }
        debug!(
            accounts = self.accounts.len(),
            slots = self.storage.len(),
            "state flushed"
        );
        Ok(())
    }

    /// Loads the account and storage namespaces from the engine.
    pub fn load(store: &dyn KeyValueStore) -> Result<Self> {
        let mut manager = Self::new();

        for (key, value) in store.scan_prefix(namespace::ACCOUNTS_PREFIX)? {
            let raw = &key[namespace::ACCOUNTS_PREFIX.len()..];
            let addr = Address::from_slice(raw).map_err(|_| {
                StorageError::Inconsistency(format!("malformed account key {}", hex_key(&key)))
            })?;
            let account: Account = basalt_codec::from_bytes(&value)?;
            manager.accounts.insert(addr, account);
        }

        for (key, value) in store.scan_prefix(namespace::STORAGE_PREFIX)? {
            let raw = &key[namespace::STORAGE_PREFIX.len()..];
            // `<addr 20>/<slot 32>`
            if raw.len() != 20 + 1 + 32 || raw[20] != b'/' {
                return Err(StorageError::Inconsistency(format!(
                    "malformed storage key {}",
                    hex_key(&key)
                )));
            }
            let addr = Address::from_slice(&raw[..20]).map_err(|_| {
                StorageError::Inconsistency(format!("malformed storage key {}", hex_key(&key)))
            })?;
            let slot = H256::from_slice(&raw[21..]).map_err(|_| {
                StorageError::Inconsistency(format!("malformed storage key {}", hex_key(&key)))
            })?;
            let value: H256 = basalt_codec::from_bytes(&value)?;
            manager.storage.insert((addr, slot), value);
        }

        debug!(accounts = manager.accounts.len(), "state loaded");
        Ok(manager)
    }
}

fn hex_key(key: &[u8]) -> String {
    key.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    #[test]
    fn balances_default_to_zero() {
        let state = StateManager::new();
        assert!(state.balance(&addr(1)).is_zero());
        assert!(!state.exists(&addr(1)));
    }

    #[test]
    fn credit_creates_client_lazily() {
        let mut state = StateManager::new();
        state.add_balance(&addr(1), &Balance::from(10u64));
        assert!(state.exists(&addr(1)));
        assert_eq!(state.balance(&addr(1)), Balance::from(10u64));
    }

    #[test]
    fn transfer_is_atomic() {
        let mut state = StateManager::new();
        state.add_balance(&addr(1), &Balance::from(50u64));

        let err = state
            .transfer(&addr(1), &addr(2), &Balance::from(60u64))
            .unwrap_err();
        assert!(matches!(err, StorageError::InsufficientFunds(_)));
        assert_eq!(state.balance(&addr(1)), Balance::from(50u64));
        assert!(state.balance(&addr(2)).is_zero());

        state
            .transfer(&addr(1), &addr(2), &Balance::from(20u64))
            .unwrap();
        assert_eq!(state.balance(&addr(1)), Balance::from(30u64));
        assert_eq!(state.balance(&addr(2)), Balance::from(20u64));
    }

    #[test]
    fn storage_diff_classification() {
        let mut state = StateManager::new();
        let a = addr(1);
        let key = H256::sha256(b"slot");
        let v1 = H256::sha256(b"v1");
        let v2 = H256::sha256(b"v2");

        assert_eq!(state.set_storage(&a, &key, &H256::NIL), StorageDiff::Unchanged);
        assert_eq!(state.set_storage(&a, &key, &v1), StorageDiff::Added);
        assert_eq!(state.set_storage(&a, &key, &v1), StorageDiff::Unchanged);
        assert_eq!(state.set_storage(&a, &key, &v2), StorageDiff::Modified);
        assert_eq!(state.set_storage(&a, &key, &H256::NIL), StorageDiff::Deleted);
        assert!(state.get_storage(&a, &key).is_nil());
    }

    #[test]
    fn rollback_restores_bit_for_bit() {
        let mut state = StateManager::new();
        state.add_balance(&addr(1), &Balance::from(100u64));
        state.create_contract(addr(9), vec![1u8], vec![]).unwrap();
        state.set_storage(&addr(9), &H256::sha256(b"k"), &H256::sha256(b"v"));

        let before_accounts = state.accounts.clone();
        let before_storage = state.storage.clone();

        let cp = state.checkpoint();
        state.add_balance(&addr(2), &Balance::from(7u64));
        state.sub_balance(&addr(1), &Balance::from(10u64)).unwrap();
        state.set_storage(&addr(9), &H256::sha256(b"k"), &H256::sha256(b"w"));
        state.destroy_contract(&addr(9), &addr(1)).unwrap();
        state.rollback(cp).unwrap();

        assert_eq!(state.accounts, before_accounts);
        assert_eq!(state.storage, before_storage);
        assert_eq!(state.open_checkpoints(), 0);
    }

    #[test]
    fn nested_rollback_reverts_only_inner_work() {
        let mut state = StateManager::new();
        let outer = state.checkpoint();
        state.add_balance(&addr(1), &Balance::from(10u64));

        let inner = state.checkpoint();
        state.add_balance(&addr(1), &Balance::from(5u64));
        state.rollback(inner).unwrap();

        assert_eq!(state.balance(&addr(1)), Balance::from(10u64));
        state.commit(outer).unwrap();
        assert_eq!(state.balance(&addr(1)), Balance::from(10u64));
    }

    #[test]
    fn commit_merges_into_enclosing_scope() {
        let mut state = StateManager::new();
        let outer = state.checkpoint();
        let inner = state.checkpoint();
        state.add_balance(&addr(1), &Balance::from(5u64));
        state.commit(inner).unwrap();

        // The inner work is still subject to the outer rollback.
        state.rollback(outer).unwrap();
        assert!(state.balance(&addr(1)).is_zero());
    }

    #[test]
    fn unknown_checkpoint_is_an_error() {
        let mut state = StateManager::new();
        let cp = state.checkpoint();
        state.commit(cp).unwrap();
        assert!(matches!(
            state.commit(cp),
            Err(StorageError::UnknownCheckpoint(_))
        ));
    }

    #[test]
    fn destroy_contract_moves_balance_and_drops_storage() {
        let mut state = StateManager::new();
        state.create_contract(addr(9), vec![1u8], vec![]).unwrap();
        state.add_balance(&addr(9), &Balance::from(40u64));
        state.set_storage(&addr(9), &H256::sha256(b"k"), &H256::sha256(b"v"));

        state.destroy_contract(&addr(9), &addr(1)).unwrap();
        assert!(!state.exists(&addr(9)));
        assert_eq!(state.balance(&addr(1)), Balance::from(40u64));
        assert!(state.get_storage(&addr(9), &H256::sha256(b"k")).is_nil());
    }

    #[test]
    fn flush_removes_destroyed_records() {
        let store = MemoryStore::new();
        let mut state = StateManager::new();
        state.create_contract(addr(9), vec![1u8], vec![]).unwrap();
        state.add_balance(&addr(9), &Balance::from(3u64));
        state.set_storage(&addr(9), &H256::sha256(b"k"), &H256::sha256(b"v"));
        state.flush(&store).unwrap();

        state.destroy_contract(&addr(9), &addr(1)).unwrap();
        state.flush(&store).unwrap();

        let loaded = StateManager::load(&store).unwrap();
        assert!(!loaded.exists(&addr(9)));
        assert!(loaded.get_storage(&addr(9), &H256::sha256(b"k")).is_nil());
        assert_eq!(loaded.balance(&addr(1)), Balance::from(3u64));
    }

    #[test]
    fn flush_load_round_trip() {
        let mut state = StateManager::new();
        state.add_balance(&addr(1), &Balance::from(100u64));
        state.bump_nonce(&addr(1));
        state.append_tx_hash(&addr(1), H256::sha256(b"t"));
        state.create_contract(addr(9), vec![1u8, 2], b"{}".to_vec()).unwrap();
        state.set_storage(&addr(9), &H256::sha256(b"k"), &H256::sha256(b"v"));

        let store = MemoryStore::new();
        state.flush(&store).unwrap();

        let loaded = StateManager::load(&store).unwrap();
        assert_eq!(loaded.accounts, state.accounts);
        assert_eq!(loaded.storage, state.storage);
    }
}
