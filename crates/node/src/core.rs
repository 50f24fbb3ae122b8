//! The node core: transaction execution, block application, the pending
//! pool, block templates, view calls and observers.
//!
//! Lock order is always state -> pool -> store. Two blocks never apply
//! concurrently; the top pointer advances monotonically; observers for block
//! addition fire after the block and all its state effects are committed,
//! while the store lock is still held.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use basalt_mempool::TransactionPool;
use basalt_storage::{BlockStore, KeyValueStore, LinkOutcome, StateManager};
use basalt_types::{
    unix_timestamp, Account, ActionType, Address, Balance, Block, BlockDepth, ContractInitData,
    StatusCode, Transaction, TransactionStatus, TransactionsSet, ViewCall, H256,
};
use basalt_vm::{CallKind, VmBackend, VmMessage, VmStatus};
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::host::EthBridge;
use crate::observer::{Observable, Subscription};
use crate::{NodeError, Result};

/// Version of the RPC surface this engine implements.
pub const API_VERSION: u32 = 1;

/// Gas granted to fee-less view calls.
const VIEW_CALL_GAS: u64 = 10_000_000;

/// The engine. One per node process.
pub struct Core {
    node_address: Address,
    engine: Arc<dyn KeyValueStore>,
    vm: Arc<dyn VmBackend>,
    state: RwLock<StateManager>,
    pool: RwLock<TransactionPool>,
    chain: RwLock<BlockStore>,
    outputs: RwLock<HashMap<H256, TransactionStatus>>,
    block_added: Observable<Block>,
    pending_added: Observable<Transaction>,
}

impl Core {
    /// Opens the engine over a persistence engine and an interpreter
    /// backend. Replays the persisted chain and state; installs genesis when
    /// the store is empty. A broken store is fatal here, never later.
    pub fn open(
        node_address: Address,
        engine: Arc<dyn KeyValueStore>,
        vm: Arc<dyn VmBackend>,
    ) -> Result<Self> {
        let chain = BlockStore::open(Arc::clone(&engine))?;
        let state = StateManager::load(&*engine)?;
        info!(
            node = %node_address,
            top_depth = chain.top_depth(),
            top = %chain.top_hash(),
            "core opened"
        );
        Ok(Self {
            node_address,
            engine,
            vm,
            state: RwLock::new(state),
            pool: RwLock::new(TransactionPool::new()),
            chain: RwLock::new(chain),
            outputs: RwLock::new(HashMap::new()),
            block_added: Observable::new(),
            pending_added: Observable::new(),
        })
    }

    /// The address this node mines to and identifies as.
    pub fn node_address(&self) -> &Address {
        &self.node_address
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Looks up an account record.
    pub fn get_account(&self, addr: &Address) -> Option<Account> {
        self.state.read().get_account(addr).cloned()
    }

    /// All storage slots of a contract, sorted by key.
    pub fn account_storage(&self, addr: &Address) -> Vec<(H256, H256)> {
        self.state.read().storage_of(addr)
    }

    /// Looks up a block by hash.
    pub fn find_block(&self, hash: &H256) -> Option<Block> {
        self.chain.read().find_block(hash).cloned()
    }

    /// Looks up the block hash at a depth.
    pub fn find_block_hash(&self, depth: BlockDepth) -> Option<H256> {
        self.chain.read().find_block_hash(depth)
    }

    /// Looks up a committed transaction by hash.
    pub fn find_transaction(&self, hash: &H256) -> Option<Transaction> {
        self.chain.read().find_transaction(hash).cloned()
    }

    /// The recorded outcome of a transaction, committed or dry-run.
    pub fn transaction_output(&self, hash: &H256) -> Option<TransactionStatus> {
        self.outputs.read().get(hash).cloned()
    }

    /// The current top block.
    pub fn top_block(&self) -> Block {
        self.chain.read().top_block().clone()
    }

    /// Depth of the current top block.
    pub fn top_depth(&self) -> BlockDepth {
        self.chain.read().top_depth()
    }

    /// Hash of the current top block.
    pub fn top_hash(&self) -> H256 {
        self.chain.read().top_hash()
    }

    /// Number of pending transactions.
    pub fn pending_count(&self) -> usize {
        self.pool.read().len()
    }

    // =========================================================================
    // Observers
    // =========================================================================

    /// Subscribes to block additions. Genesis and replayed blocks are not
    /// announced. Callbacks must be non-blocking: they run before the store
    /// lock is released.
    pub fn subscribe_block_added(
        &self,
        callback: impl Fn(&Block) + Send + Sync + 'static,
    ) -> Subscription<Block> {
        self.block_added.subscribe(callback)
    }

    /// Subscribes to pool admissions. Callbacks run outside the pool lock.
    pub fn subscribe_pending_added(
        &self,
        callback: impl Fn(&Transaction) + Send + Sync + 'static,
    ) -> Subscription<Transaction> {
        self.pending_added.subscribe(callback)
    }

    // =========================================================================
    // Pending pool
    // =========================================================================

    /// Admits a transaction into the pending pool.
    ///
    /// Admission requires a valid signature, no duplicate in the pool or the
    /// chain, and a dry-run reaching `Success` against a throwaway snapshot
    /// layered on the current top state. The returned status is recorded in
    /// the output table either way.
    pub fn add_pending(&self, tx: Transaction) -> TransactionStatus {
        let status = self.admit(&tx);
        self.outputs.write().insert(tx.hash(), status.clone());
        if status.is_success() {
            // Outside the pool lock.
            self.pending_added.notify(&tx);
        }
        status
    }

    fn admit(&self, tx: &Transaction) -> TransactionStatus {
        // The builder and the codec both refuse these, but transactions can
        // also arrive through serde surfaces.
        if tx.amount().is_zero() || tx.fee().is_zero() {
            return TransactionStatus::rejected(Balance::zero(), "amount and fee must be positive");
        }
        if !tx.check_sign() {
            return TransactionStatus::rejected(Balance::zero(), "invalid signature");
        }

        // Holding the state write lock serializes admission against block
        // application; the pool lock is taken only around its own data, never
        // across the VM dry-run.
        let mut state = self.state.write();
        let hash = tx.hash();
        if self.pool.read().contains(&hash) {
            return TransactionStatus::rejected(Balance::zero(), "transaction already known");
        }
        let chain = self.chain.read();
        if chain.contains_transaction(&hash) {
            return TransactionStatus::rejected(Balance::zero(), "transaction already known");
        }

        // Dry-run in the context the transaction would actually see.
        let context = Block::new(
            chain.top_depth() + 1,
            chain.top_hash(),
            unix_timestamp(),
            self.node_address,
            TransactionsSet::new(),
        );
        let cp = state.checkpoint();
        let status = self.try_perform(&mut state, &chain, &context, tx);
        if let Err(error) = state.rollback(cp) {
            warn!(%error, "dry-run rollback failed");
        }

        if !status.is_success() {
            debug!(hash = %hash, %status, "pending transaction refused");
            return status;
        }
        let mut pool = self.pool.write();
        if let Err(error) = pool.insert(tx.clone()) {
            return TransactionStatus::rejected(Balance::zero(), error.to_string());
        }
        debug!(hash = %hash, pending = pool.len(), "transaction admitted");
        status
    }

    // =========================================================================
    // Templates
    // =========================================================================

    /// A block template for the miner: next depth, linked to the current
    /// top, carrying the pending transactions in insertion order. The miner
    /// owns the nonce and may trim the set.
    pub fn block_template(&self) -> Block {
        let pool = self.pool.read();
        let chain = self.chain.read();
        Block::new(
            chain.top_depth() + 1,
            chain.top_hash(),
            unix_timestamp(),
            self.node_address,
            pool.ordered(),
        )
    }

    // =========================================================================
    // Block application
    // =========================================================================

    /// Tries to extend the chain with `block`.
    ///
    /// The block must be unknown, link onto the current top, and carry only
    /// transactions with valid signatures. Transactions apply in list order
    /// inside one state checkpoint; a `Rejected` outcome anywhere rolls the
    /// whole block back. `Revert` and `Failed` outcomes commit their fee
    /// effects and are recorded like successes.
    pub fn try_add_block(&self, block: &Block) -> bool {
        let mut state = self.state.write();
        let mut pool = self.pool.write();
        let mut chain = self.chain.write();

        match chain.check_link(block) {
            LinkOutcome::Extends => {}
            outcome => {
                debug!(hash = %block.hash(), ?outcome, "block does not extend the chain");
                return false;
            }
        }
        if !block.transactions().iter().all(Transaction::check_sign) {
            warn!(hash = %block.hash(), "block carries an invalid signature");
            return false;
        }

        let cp = state.checkpoint();
        let mut statuses = Vec::with_capacity(block.transactions().len());
        for tx in block.transactions() {
            let status = self.try_perform(&mut state, &chain, block, tx);
            if status.status() == StatusCode::Rejected {
                warn!(
                    block = %block.hash(),
                    tx = %tx.hash(),
                    %status,
                    "transaction rejected, rolling block back"
                );
                if let Err(error) = state.rollback(cp) {
                    warn!(%error, "block rollback failed");
                }
                return false;
            }
            statuses.push((tx.hash(), status));
        }

        if let Err(error) = state.commit(cp) {
            warn!(%error, "block commit failed");
            return false;
        }
        if let Err(error) = state.flush(&*self.engine) {
            warn!(%error, "state flush failed");
        }
        if let Err(error) = chain.insert(block.clone()) {
            warn!(%error, "block insert failed after state commit");
            return false;
        }

        {
            let mut outputs = self.outputs.write();
            for (hash, status) in statuses {
                outputs.insert(hash, status);
            }
        }
        pool.remove_committed(block.transactions());

        info!(
            depth = block.depth(),
            hash = %block.hash(),
            txs = block.transactions().len(),
            "block applied"
        );
        // State effects are committed; the store lock is still held.
        self.block_added.notify(block);
        true
    }

    // =========================================================================
    // Transaction execution
    // =========================================================================

    /// Applies one transaction against `state` in the context of `block`.
    ///
    /// The action is classified once from the transaction shape and the
    /// recipient's account kind, and every status this produces carries it.
    fn try_perform(
        &self,
        state: &mut StateManager,
        chain: &BlockStore,
        block: &Block,
        tx: &Transaction,
    ) -> TransactionStatus {
        let action = if tx.to().is_null() {
            ActionType::ContractCreation
        } else if state.is_contract(tx.to()) {
            ActionType::ContractCall
        } else {
            ActionType::Transfer
        };
        self.apply_classified(state, chain, block, tx, action)
            .with_action(action)
    }

    /// The execution body behind [`Self::try_perform`].
    ///
    /// The debit of `amount + fee` happens first; what follows depends on
    /// the classified action. Contract execution flows through the VM
    /// backend behind its own checkpoint, so a revert or failure restores
    /// the state and then settles only the fee.
    fn apply_classified(
        &self,
        state: &mut StateManager,
        chain: &BlockStore,
        block: &Block,
        tx: &Transaction,
        action: ActionType,
    ) -> TransactionStatus {
        let fee_budget = tx.fee().clone();
        let total = tx.amount().clone() + tx.fee();
        if state.balance(tx.from()) < total {
            return TransactionStatus::rejected(Balance::zero(), "insufficient funds");
        }

        let cp = state.checkpoint();
        if state.sub_balance(tx.from(), &total).is_err() {
            let _ = state.rollback(cp);
            return TransactionStatus::rejected(Balance::zero(), "insufficient funds");
        }
        let gas_budget = fee_budget.as_gas();

        let (result, success_message) = if action == ActionType::ContractCreation {
            let contract_addr = tx.from().contract_address(state.nonce(tx.from()));
            let init: ContractInitData = match basalt_codec::from_bytes(tx.data()) {
                Ok(init) => init,
                Err(error) => {
                    let _ = state.rollback(cp);
                    return TransactionStatus::rejected(
                        Balance::zero(),
                        format!("malformed contract init data: {error}"),
                    );
                }
            };
            if state
                .create_contract(contract_addr, init.code.clone(), Bytes::new())
                .is_err()
            {
                let _ = state.rollback(cp);
                return TransactionStatus::rejected(Balance::zero(), "contract address occupied");
            }
            state.add_balance(&contract_addr, tx.amount());

            let msg = VmMessage {
                kind: CallKind::Create,
                sender: *tx.from(),
                recipient: contract_addr,
                value: tx.amount().clone(),
                input: init.init.clone(),
                gas: gas_budget,
                depth: 0,
            };
            let mut bridge = EthBridge::new(state, chain, &*self.vm, block, tx);
            let result = bridge.execute(&msg, &init.code);
            if result.is_success() {
                // The init code's return value is the runtime code.
                if state.set_code(&contract_addr, result.output.clone()).is_err() {
                    // The constructor destroyed its own account.
                    let _ = state.rollback(cp);
                    return TransactionStatus::failed(Balance::zero(), "contract vanished");
                }
            }
            (result, contract_addr.to_base58())
        } else if action == ActionType::ContractCall {
            state.add_balance(tx.to(), tx.amount());
            let code = match state.code(tx.to()) {
                Some(code) => code,
                None => {
                    let _ = state.rollback(cp);
                    return TransactionStatus::rejected(Balance::zero(), "contract has no code");
                }
            };
            let msg = VmMessage {
                kind: CallKind::Call,
                sender: *tx.from(),
                recipient: *tx.to(),
                value: tx.amount().clone(),
                input: tx.data().clone(),
                gas: gas_budget,
                depth: 0,
            };
            let mut bridge = EthBridge::new(state, chain, &*self.vm, block, tx);
            let result = bridge.execute(&msg, &code);
            let message = BASE64.encode(&result.output);
            (result, message)
        } else {
            // Plain transfer: the whole fee is consumed by inclusion.
            state.add_balance(tx.to(), tx.amount());
            state.add_balance(block.coinbase(), &fee_budget);
            self.settle_success(state, tx);
            let _ = state.commit(cp);
            return TransactionStatus::success(Balance::zero(), "");
        };

        match result.status {
            VmStatus::Success => {
                let consumed = Balance::from(gas_budget.saturating_sub(result.gas_left));
                let fee_left = fee_budget
                    .checked_sub(&consumed)
                    .unwrap_or_else(Balance::zero);
                state.add_balance(tx.from(), &fee_left);
                state.add_balance(block.coinbase(), &consumed);
                self.settle_success(state, tx);
                let _ = state.commit(cp);
                TransactionStatus::success(fee_left, success_message)
            }
            VmStatus::Revert => {
                let consumed = Balance::from(gas_budget.saturating_sub(result.gas_left));
                let fee_left = fee_budget
                    .checked_sub(&consumed)
                    .unwrap_or_else(Balance::zero);
                let _ = state.rollback(cp);
                // The consumed portion of the fee is burned on revert.
                let _ = state.sub_balance(tx.from(), &consumed);
                TransactionStatus::revert(fee_left, BASE64.encode(&result.output))
            }
            VmStatus::Failure => {
                let _ = state.rollback(cp);
                // A fatal failure consumes the whole fee.
                if state.sub_balance(tx.from(), &fee_budget).is_ok() {
                    state.add_balance(block.coinbase(), &fee_budget);
                }
                TransactionStatus::failed(Balance::zero(), "execution failed")
            }
        }
    }

    /// Step common to every successful application: record the transaction
    /// on both client endpoints and bump the sender nonce.
    fn settle_success(&self, state: &mut StateManager, tx: &Transaction) {
        let hash = tx.hash();
        state.append_tx_hash(tx.from(), hash);
        if !tx.to().is_null() && tx.to() != tx.from() {
            state.append_tx_hash(tx.to(), hash);
        }
        state.bump_nonce(tx.from());
    }

    // =========================================================================
    // View calls
    // =========================================================================

    /// Executes a contract call against a read-only snapshot of the current
    /// top state: no fee, no persistence, the signature checked only when
    /// present. Returns the VM's return bytes.
    pub fn call_view(&self, call: &ViewCall) -> Result<Bytes> {
        if !call.sign().is_none() && !call.check_sign() {
            return Err(NodeError::Validation("invalid view call signature".into()));
        }

        let mut fork = self.state.read().fork();
        let chain = self.chain.read();

        let code = fork
            .code(call.contract_address())
            .ok_or_else(|| NodeError::NotFound(format!("contract {}", call.contract_address())))?;

        let context = chain.top_block().clone();
        let msg = VmMessage {
            kind: CallKind::Call,
            sender: *call.from(),
            recipient: *call.contract_address(),
            value: Balance::zero(),
            input: call.data().clone(),
            gas: VIEW_CALL_GAS,
            depth: 0,
        };
        let mut bridge = EthBridge::for_view(&mut fork, &chain, &*self.vm, &context, *call.from());
        let result = bridge.execute(&msg, &code);
        // The fork is dropped here; every mutation is discarded.

        match result.status {
            VmStatus::Success => Ok(result.output),
            VmStatus::Revert => Err(NodeError::ViewReverted(BASE64.encode(&result.output))),
            VmStatus::Failure => Err(NodeError::ViewFailed),
        }
    }
}
