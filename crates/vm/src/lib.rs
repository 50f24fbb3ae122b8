//! # Basalt VM Boundary
//!
//! The contract interpreter is a plug-in. This crate pins down the two
//! traits that form the boundary:
//!
//! - [`HostContext`] - what the interpreter may ask of the node while a
//!   contract runs: account and storage access, balance queries, nested
//!   calls, transaction context, historical block hashes, logs
//! - [`VmBackend`] - the interpreter itself: give it a host, a message and
//!   code, get back a [`VmResult`]
//!
//! Interpreter-specific error types never cross this boundary. An execution
//! either succeeds, reverts (the caller sees the unspent gas), or fails
//! (all gas is consumed). [`NoVm`] is the backend wired when no interpreter
//! is linked into the node.

#![warn(missing_docs)]
#![deny(unsafe_code)]

use basalt_types::{Address, Balance, H256};
use bytes::Bytes;

/// Kind of a VM message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// A message call against deployed code.
    Call,
    /// Deployment of new code.
    Create,
}

/// One message handed to the interpreter: the unit of contract execution.
#[derive(Debug, Clone)]
pub struct VmMessage {
    /// Call or create.
    pub kind: CallKind,
    /// Account the execution acts as.
    pub sender: Address,
    /// Account being called; the already-derived address for creations.
    pub recipient: Address,
    /// Value transferred with the message.
    pub value: Balance,
    /// Calldata, or constructor arguments for creations.
    pub input: Bytes,
    /// Gas available to this message.
    pub gas: u64,
    /// Nesting depth, 0 for the outermost message of a transaction.
    pub depth: u32,
}

/// Terminal state of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmStatus {
    /// Ran to completion; state effects stand.
    Success,
    /// Explicit revert; state effects must be rolled back, unspent gas
    /// returned to the caller.
    Revert,
    /// Any other failure; state effects must be rolled back and all gas is
    /// consumed.
    Failure,
}

/// Result of executing one [`VmMessage`].
#[derive(Debug, Clone)]
pub struct VmResult {
    /// Terminal status.
    pub status: VmStatus,
    /// Gas left unspent. Zero unless `status` is `Success` or `Revert`.
    pub gas_left: u64,
    /// Return data: call output, runtime code for creations, or the revert
    /// payload.
    pub output: Bytes,
}

impl VmResult {
    /// A successful result.
    pub fn success(gas_left: u64, output: impl Into<Bytes>) -> Self {
        Self {
            status: VmStatus::Success,
            gas_left,
            output: output.into(),
        }
    }

    /// A revert carrying its payload.
    pub fn revert(gas_left: u64, output: impl Into<Bytes>) -> Self {
        Self {
            status: VmStatus::Revert,
            gas_left,
            output: output.into(),
        }
    }

    /// A failure; consumes all gas.
    pub fn failure() -> Self {
        Self {
            status: VmStatus::Failure,
            gas_left: 0,
            output: Bytes::new(),
        }
    }

    /// Whether the execution succeeded.
    pub fn is_success(&self) -> bool {
        self.status == VmStatus::Success
    }
}

/// Effect of a storage write, as reported to the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStatus {
    /// The slot already held this value.
    Unchanged,
    /// An existing non-zero slot now holds a different non-zero value.
    Modified,
    /// A zero slot became non-zero.
    Added,
    /// A non-zero slot was set to zero.
    Deleted,
}

/// Transaction-level context visible to a running contract.
#[derive(Debug, Clone)]
pub struct TxContext {
    /// Sender of the enclosing transaction.
    pub origin: Address,
    /// Fee per gas unit the transaction pays.
    pub fee_per_unit: Balance,
    /// Producer of the enclosing block.
    pub block_coinbase: Address,
    /// Depth of the enclosing block.
    pub block_depth: u64,
    /// Timestamp of the enclosing block, unix seconds.
    pub block_timestamp: u64,
}

/// The node-side services an interpreter may call while executing.
///
/// Each instance is bound to exactly one (associated block, associated
/// transaction, state handle) triple. Mutations flow through the same state
/// snapshot the enclosing transaction runs in, so a revert above unwinds
/// everything a contract did here.
pub trait HostContext {
    /// Whether an account exists.
    fn account_exists(&self, addr: &Address) -> bool;

    /// Reads a storage slot; absent slots read as zero.
    fn get_storage(&self, addr: &Address, key: &H256) -> H256;

    /// Writes a storage slot, reporting what happened.
    fn set_storage(&mut self, addr: &Address, key: &H256, value: &H256) -> StorageStatus;

    /// The balance of an account, zero when absent.
    fn get_balance(&self, addr: &Address) -> Balance;

    /// Size of the code stored at an account.
    fn get_code_size(&self, addr: &Address) -> usize;

    /// Hash of the code stored at an account; [`H256::NIL`] when absent.
    fn get_code_hash(&self, addr: &Address) -> H256;

    /// Copies code starting at `offset` into `buffer`, returning the number
    /// of bytes copied.
    fn copy_code(&self, addr: &Address, offset: usize, buffer: &mut [u8]) -> usize;

    /// Destroys the executing contract, moving its remaining balance to the
    /// beneficiary.
    fn selfdestruct(&mut self, addr: &Address, beneficiary: &Address);

    /// Performs a nested message call and returns its result.
    fn call(&mut self, msg: &VmMessage) -> VmResult;

    /// Context of the enclosing transaction and block.
    fn get_tx_context(&self) -> TxContext;

    /// Hash of the block at the given depth, [`H256::NIL`] when unknown.
    fn get_block_hash(&self, depth: u64) -> H256;

    /// Emits a log record. Observed, not persisted.
    fn emit_log(&mut self, addr: &Address, data: &[u8], topics: &[H256]);
}

/// The interpreter plug-in boundary.
pub trait VmBackend: Send + Sync {
    /// Executes `code` for `msg`, calling back into `host` for state.
    fn execute(&self, host: &mut dyn HostContext, msg: &VmMessage, code: &[u8]) -> VmResult;
}

/// Backend used when no interpreter is linked: every execution fails and
/// consumes its gas, so contract transactions report `Failed` instead of
/// silently pretending to run.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVm;

impl VmBackend for NoVm {
    fn execute(&self, _host: &mut dyn HostContext, _msg: &VmMessage, _code: &[u8]) -> VmResult {
        VmResult::failure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vm_result_constructors() {
        assert!(VmResult::success(5, Bytes::new()).is_success());
        assert!(!VmResult::revert(5, Bytes::new()).is_success());
        let failed = VmResult::failure();
        assert_eq!(failed.gas_left, 0);
        assert_eq!(failed.status, VmStatus::Failure);
    }
}
