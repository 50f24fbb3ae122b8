//! The host bridge between the contract interpreter and the node state.
//!
//! One [`EthBridge`] is bound to exactly one (associated block, associated
//! transaction, state handle) triple for the duration of a single
//! transaction execution. Every host operation maps one-to-one onto the
//! state manager; nested calls recurse through the same bridge and the same
//! checkpoint stack, so a rollback above unwinds everything below.

use basalt_storage::{BlockStore, StateManager, StorageDiff};
use basalt_types::{Address, Balance, Block, Transaction, H256};
use basalt_vm::{
    CallKind, HostContext, StorageStatus, TxContext, VmBackend, VmMessage, VmResult,
};
use tracing::{debug, trace, warn};

/// Maximum nesting depth of message calls.
const MAX_CALL_DEPTH: u32 = 1024;

/// Adapter giving the interpreter access to node state during one
/// transaction.
pub struct EthBridge<'a> {
    state: &'a mut StateManager,
    chain: &'a BlockStore,
    vm: &'a dyn VmBackend,
    block: &'a Block,
    origin: Address,
}

impl<'a> EthBridge<'a> {
    /// Binds a bridge to one transaction execution context.
    pub fn new(
        state: &'a mut StateManager,
        chain: &'a BlockStore,
        vm: &'a dyn VmBackend,
        block: &'a Block,
        tx: &'a Transaction,
    ) -> Self {
        Self {
            state,
            chain,
            vm,
            block,
            origin: *tx.from(),
        }
    }

    /// Binds a bridge for a fee-less view call acting as `origin`.
    pub fn for_view(
        state: &'a mut StateManager,
        chain: &'a BlockStore,
        vm: &'a dyn VmBackend,
        block: &'a Block,
        origin: Address,
    ) -> Self {
        Self {
            state,
            chain,
            vm,
            block,
            origin,
        }
    }

    /// Runs `code` for `msg` through the interpreter backend against this
    /// bridge.
    pub fn execute(&mut self, msg: &VmMessage, code: &[u8]) -> VmResult {
        let vm = self.vm;
        vm.execute(self, msg, code)
    }
}

impl HostContext for EthBridge<'_> {
    fn account_exists(&self, addr: &Address) -> bool {
        self.state.exists(addr)
    }

    fn get_storage(&self, addr: &Address, key: &H256) -> H256 {
        self.state.get_storage(addr, key)
    }

    fn set_storage(&mut self, addr: &Address, key: &H256, value: &H256) -> StorageStatus {
        match self.state.set_storage(addr, key, value) {
            StorageDiff::Unchanged => StorageStatus::Unchanged,
            StorageDiff::Modified => StorageStatus::Modified,
            StorageDiff::Added => StorageStatus::Added,
            StorageDiff::Deleted => StorageStatus::Deleted,
        }
    }

    fn get_balance(&self, addr: &Address) -> Balance {
        self.state.balance(addr)
    }

    fn get_code_size(&self, addr: &Address) -> usize {
        self.state.code(addr).map(|c| c.len()).unwrap_or(0)
    }

    fn get_code_hash(&self, addr: &Address) -> H256 {
        match self.state.code(addr) {
            Some(code) => H256::sha256(&code),
            None => H256::NIL,
        }
    }

    fn copy_code(&self, addr: &Address, offset: usize, buffer: &mut [u8]) -> usize {
        let Some(code) = self.state.code(addr) else {
            return 0;
        };
        if offset >= code.len() {
            return 0;
        }
        let n = buffer.len().min(code.len() - offset);
        buffer[..n].copy_from_slice(&code[offset..offset + n]);
        n
    }

    fn selfdestruct(&mut self, addr: &Address, beneficiary: &Address) {
        if let Err(error) = self.state.destroy_contract(addr, beneficiary) {
            warn!(%addr, %error, "selfdestruct on non-contract ignored");
        }
    }

    fn call(&mut self, msg: &VmMessage) -> VmResult {
        if msg.depth >= MAX_CALL_DEPTH {
            return VmResult::failure();
        }
        if msg.kind == CallKind::Create {
            // Nested deployment is not part of the host contract this node
            // exposes; the outer transaction keeps running.
            debug!("nested CREATE refused");
            return VmResult::failure();
        }

        let cp = self.state.checkpoint();

        if !msg.value.is_zero() {
            if let Err(error) = self.state.transfer(&msg.sender, &msg.recipient, &msg.value) {
                trace!(%error, "nested call value transfer failed");
                let _ = self.state.rollback(cp);
                return VmResult::revert(msg.gas, Vec::new());
            }
        }

        // A call against an account without code is a plain value transfer.
        let Some(code) = self.state.code(&msg.recipient) else {
            let _ = self.state.commit(cp);
            return VmResult::success(msg.gas, Vec::new());
        };

        let result = self.execute(msg, &code);
        match result.is_success() {
            true => {
                let _ = self.state.commit(cp);
            }
            false => {
                let _ = self.state.rollback(cp);
            }
        }
        result
    }

    fn get_tx_context(&self) -> TxContext {
        TxContext {
            origin: self.origin,
            // Fees buy execution one unit of balance per unit of gas.
            fee_per_unit: Balance::from(1u64),
            block_coinbase: *self.block.coinbase(),
            block_depth: self.block.depth(),
            block_timestamp: self.block.timestamp(),
        }
    }

    fn get_block_hash(&self, depth: u64) -> H256 {
        self.chain.find_block_hash(depth).unwrap_or(H256::NIL)
    }

    fn emit_log(&mut self, addr: &Address, data: &[u8], topics: &[H256]) {
        // Observed, not persisted.
        debug!(
            contract = %addr,
            topics = topics.len(),
            bytes = data.len(),
            "contract log"
        );
    }
}
