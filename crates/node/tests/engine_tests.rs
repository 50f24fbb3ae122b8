//! End-to-end engine scenarios: transfers, contract creation and calls,
//! reverts, chain extension rules, pool exclusion and snapshot atomicity.

use std::sync::Arc;

use basalt_crypto::ecdsa::PrivateKey;
use basalt_node::Core;
use basalt_storage::{MemoryStore, StateManager};
use basalt_types::{
    ActionType, Address, Balance, Block, ContractInitData, StatusCode, Transaction,
    TransactionBuilder, TransactionsSet, H256,
};
use basalt_vm::{CallKind, HostContext, VmBackend, VmMessage, VmResult};

// =============================================================================
// Scripted interpreter backend
// =============================================================================

type Script = Box<dyn Fn(&mut dyn HostContext, &VmMessage, &[u8]) -> VmResult + Send + Sync>;

struct ScriptedVm {
    on_create: Script,
    on_call: Script,
}

impl ScriptedVm {
    fn calls_only(on_call: Script) -> Arc<Self> {
        Arc::new(Self {
            on_create: Box::new(|_, msg, _| VmResult::success(msg.gas, Vec::new())),
            on_call,
        })
    }
}

impl VmBackend for ScriptedVm {
    fn execute(&self, host: &mut dyn HostContext, msg: &VmMessage, code: &[u8]) -> VmResult {
        match msg.kind {
            CallKind::Create => (self.on_create)(host, msg, code),
            CallKind::Call => (self.on_call)(host, msg, code),
        }
    }
}

// =============================================================================
// Fixtures
// =============================================================================

const COINBASE: Address = Address::new([0xcb; 20]);

fn pad20(addr: &Address) -> H256 {
    let mut bytes = [0u8; 32];
    bytes[12..].copy_from_slice(addr.as_bytes());
    H256::new(bytes)
}

/// Opens a core over an engine pre-seeded with client balances and
/// contracts, exactly as a persistent node would find them on restart.
fn seeded_core(
    vm: Arc<dyn VmBackend>,
    balances: &[(Address, u64)],
    contracts: &[(Address, &[u8])],
) -> Arc<Core> {
    let engine = Arc::new(MemoryStore::new());
    let mut seed = StateManager::new();
    for (addr, amount) in balances {
        seed.add_balance(addr, &Balance::from(*amount));
    }
    for (addr, code) in contracts {
        seed.create_contract(*addr, code.to_vec(), Vec::new()).unwrap();
    }
    seed.flush(&*engine).unwrap();
    Arc::new(Core::open(Address::new([0xee; 20]), engine, vm).unwrap())
}

fn keyed_account() -> (PrivateKey, Address) {
    let key = PrivateKey::random();
    let address = Address::from_public_key(&key.public_key());
    (key, address)
}

fn signed_transfer(key: &PrivateKey, to: Address, amount: u64, fee: u64) -> Transaction {
    let from = Address::from_public_key(&key.public_key());
    let mut tx = TransactionBuilder::new()
        .from(from)
        .to(to)
        .amount(Balance::from(amount))
        .fee(Balance::from(fee))
        .timestamp(1_700_000_000)
        .build()
        .unwrap();
    tx.sign_with(key).unwrap();
    tx
}

fn signed_call(key: &PrivateKey, to: Address, amount: u64, fee: u64, data: Vec<u8>) -> Transaction {
    let from = Address::from_public_key(&key.public_key());
    let mut tx = TransactionBuilder::new()
        .from(from)
        .to(to)
        .amount(Balance::from(amount))
        .fee(Balance::from(fee))
        .timestamp(1_700_000_000)
        .data(data)
        .build()
        .unwrap();
    tx.sign_with(key).unwrap();
    tx
}

fn block_with(core: &Core, txs: Vec<Transaction>) -> Block {
    Block::new(
        core.top_depth() + 1,
        core.top_hash(),
        1_700_000_100,
        COINBASE,
        txs.into_iter().collect(),
    )
}

fn balance_of(core: &Core, addr: &Address) -> Balance {
    core.get_account(addr)
        .map(|a| a.balance().clone())
        .unwrap_or_else(Balance::zero)
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn transfer_success_settles_all_three_parties() {
    let (key, a) = keyed_account();
    let b = Address::new([0x02; 20]);
    let core = seeded_core(Arc::new(basalt_vm::NoVm), &[(a, 1000)], &[]);

    let tx = signed_transfer(&key, b, 100, 10);
    let hash = tx.hash();
    let block = block_with(&core, vec![tx]);
    assert!(core.try_add_block(&block));

    assert_eq!(balance_of(&core, &a), Balance::from(890u64));
    assert_eq!(balance_of(&core, &b), Balance::from(100u64));
    assert_eq!(balance_of(&core, &COINBASE), Balance::from(10u64));

    let status = core.transaction_output(&hash).unwrap();
    assert_eq!(status.status(), StatusCode::Success);
    assert_eq!(status.action_type(), ActionType::Transfer);
    assert!(status.fee_left().is_zero());

    // Both endpoints recorded the transaction; the sender nonce moved.
    match core.get_account(&a).unwrap() {
        basalt_types::Account::Client {
            nonce, tx_hashes, ..
        } => {
            assert_eq!(nonce, 1);
            assert_eq!(tx_hashes, vec![hash]);
        }
        other => panic!("expected client account, got {other:?}"),
    }
}

#[test]
fn insufficient_funds_rejects_before_any_state_change() {
    let (key, a) = keyed_account();
    let core = seeded_core(Arc::new(basalt_vm::NoVm), &[(a, 50)], &[]);

    let tx = signed_transfer(&key, Address::new([0x02; 20]), 40, 20);
    let status = core.add_pending(tx);
    assert_eq!(status.status(), StatusCode::Rejected);
    assert_eq!(core.pending_count(), 0);
    assert_eq!(balance_of(&core, &a), Balance::from(50u64));
}

#[test]
fn unsigned_transactions_never_enter_the_pool() {
    let (_, a) = keyed_account();
    let core = seeded_core(Arc::new(basalt_vm::NoVm), &[(a, 1000)], &[]);

    let tx = TransactionBuilder::new()
        .from(a)
        .to(Address::new([0x02; 20]))
        .amount(Balance::from(1u64))
        .fee(Balance::from(1u64))
        .timestamp(0)
        .build()
        .unwrap();
    let status = core.add_pending(tx);
    assert_eq!(status.status(), StatusCode::Rejected);
    // Refused at admission, before the engine classified the action.
    assert_eq!(status.action_type(), ActionType::None);
    assert_eq!(core.pending_count(), 0);
}

#[test]
fn contract_creation_stores_caller_and_view_reads_it_back() {
    let (key, a) = keyed_account();
    let runtime: &[u8] = &[0xfe, 0xed];

    // Deployment stores the caller at slot 0 and returns the runtime code;
    // calls read slot 0 back.
    let vm = Arc::new(ScriptedVm {
        on_create: Box::new(move |host, msg, _code| {
            let caller = pad20(&msg.sender);
            host.set_storage(&msg.recipient, &H256::NIL, &caller);
            VmResult::success(msg.gas - 100, vec![0xfe, 0xed])
        }),
        on_call: Box::new(|host, msg, _code| {
            let stored = host.get_storage(&msg.recipient, &H256::NIL);
            VmResult::success(msg.gas - 10, stored.as_bytes().to_vec())
        }),
    });
    let core = seeded_core(vm, &[(a, 10_000)], &[]);

    let init = ContractInitData::new(vec![0x60, 0x80], Vec::new());
    let mut deploy = TransactionBuilder::new()
        .from(a)
        .to(Address::NULL)
        .amount(Balance::from(5u64))
        .fee(Balance::from(500u64))
        .timestamp(1_700_000_000)
        .data(basalt_codec::to_bytes(&init))
        .build()
        .unwrap();
    deploy.sign_with(&key).unwrap();
    let deploy_hash = deploy.hash();

    let block = block_with(&core, vec![deploy]);
    assert!(core.try_add_block(&block));

    let status = core.transaction_output(&deploy_hash).unwrap();
    assert_eq!(status.status(), StatusCode::Success);
    assert_eq!(status.action_type(), ActionType::ContractCreation);
    // 100 gas consumed out of a fee of 500.
    assert_eq!(status.fee_left(), &Balance::from(400u64));

    // The creation message carries the new contract address in Base58.
    let contract: Address = status.message().parse().unwrap();
    assert_eq!(contract, a.contract_address(0));
    let account = core.get_account(&contract).unwrap();
    assert!(account.is_contract());
    assert_eq!(account.code(), runtime);
    assert_eq!(account.balance(), &Balance::from(5u64));

    // Slot 0 holds the padded deployer address.
    assert_eq!(core.account_storage(&contract), vec![(H256::NIL, pad20(&a))]);

    // A view call reads the same value without touching state.
    let view = basalt_types::ViewCall::new(a, contract, 1_700_000_200, Vec::new());
    let output = core.call_view(&view).unwrap();
    assert_eq!(output.as_ref(), pad20(&a).as_bytes());
    assert_eq!(core.account_storage(&contract), vec![(H256::NIL, pad20(&a))]);
}

#[test]
fn revert_burns_only_the_consumed_fee() {
    let (key, a) = keyed_account();
    let contract = Address::new([0x0c; 20]);
    let vm = ScriptedVm::calls_only(Box::new(|_, msg, _| {
        VmResult::revert(msg.gas - 30, b"nope".to_vec())
    }));
    let core = seeded_core(vm, &[(a, 1000)], &[(contract, &[0x01])]);

    let tx = signed_call(&key, contract, 50, 100, vec![0xaa]);
    let hash = tx.hash();
    let block = block_with(&core, vec![tx]);
    assert!(core.try_add_block(&block));

    let status = core.transaction_output(&hash).unwrap();
    assert_eq!(status.status(), StatusCode::Revert);
    assert_eq!(status.action_type(), ActionType::ContractCall);
    assert_eq!(status.fee_left(), &Balance::from(70u64));
    // The revert payload travels Base64-encoded in the message.
    assert_eq!(status.message(), "bm9wZQ==");

    // Only the consumed fee left the sender; the amount came back, nothing
    // reached the contract or the coinbase.
    assert_eq!(balance_of(&core, &a), Balance::from(970u64));
    assert!(balance_of(&core, &contract).is_zero());
    assert!(balance_of(&core, &COINBASE).is_zero());
}

#[test]
fn failed_execution_consumes_the_whole_fee() {
    let (key, a) = keyed_account();
    let contract = Address::new([0x0c; 20]);
    let vm = ScriptedVm::calls_only(Box::new(|_, _, _| VmResult::failure()));
    let core = seeded_core(vm, &[(a, 1000)], &[(contract, &[0x01])]);

    let tx = signed_call(&key, contract, 50, 100, vec![0xaa]);
    let hash = tx.hash();
    let block = block_with(&core, vec![tx]);
    assert!(core.try_add_block(&block));

    let status = core.transaction_output(&hash).unwrap();
    assert_eq!(status.status(), StatusCode::Failed);
    assert!(status.fee_left().is_zero());
    assert_eq!(balance_of(&core, &a), Balance::from(900u64));
    assert_eq!(balance_of(&core, &COINBASE), Balance::from(100u64));
    assert!(balance_of(&core, &contract).is_zero());
}

#[test]
fn chain_extension_accepts_exactly_the_next_depth() {
    let core = seeded_core(Arc::new(basalt_vm::NoVm), &[], &[]);

    // Grow the chain to depth 5 with empty blocks.
    for _ in 0..5 {
        let block = block_with(&core, Vec::new());
        assert!(core.try_add_block(&block));
    }
    assert_eq!(core.top_depth(), 5);
    let top_hash = core.top_hash();

    // Same depth as the tip: rejected.
    let stale = Block::new(5, top_hash, 1, COINBASE, TransactionsSet::new());
    assert!(!core.try_add_block(&stale));

    // Skipping a depth: rejected.
    let skipping = Block::new(7, top_hash, 1, COINBASE, TransactionsSet::new());
    assert!(!core.try_add_block(&skipping));

    // Correct depth but wrong parent: rejected.
    let orphan = Block::new(6, H256::sha256(b"other"), 1, COINBASE, TransactionsSet::new());
    assert!(!core.try_add_block(&orphan));

    // Correct depth, correct parent: accepted.
    let good = Block::new(6, top_hash, 1, COINBASE, TransactionsSet::new());
    assert!(core.try_add_block(&good));
    assert_eq!(core.top_depth(), 6);
}

#[test]
fn committed_transactions_leave_the_pool_and_stay_excluded() {
    let (key, a) = keyed_account();
    let core = seeded_core(Arc::new(basalt_vm::NoVm), &[(a, 1000)], &[]);

    let tx = signed_transfer(&key, Address::new([0x02; 20]), 100, 10);
    assert!(core.add_pending(tx.clone()).is_success());
    assert_eq!(core.pending_count(), 1);

    // Re-submission while pending is a duplicate.
    assert_eq!(
        core.add_pending(tx.clone()).status(),
        StatusCode::Rejected
    );

    let block = block_with(&core, vec![tx.clone()]);
    assert!(core.try_add_block(&block));
    assert_eq!(core.pending_count(), 0);

    // Re-submission after commitment is still a duplicate.
    assert_eq!(core.add_pending(tx).status(), StatusCode::Rejected);
}

#[test]
fn template_links_to_top_and_carries_pending_in_order() {
    let (key, a) = keyed_account();
    let core = seeded_core(Arc::new(basalt_vm::NoVm), &[(a, 10_000)], &[]);

    let first = signed_transfer(&key, Address::new([0x02; 20]), 10, 1);
    let second = signed_transfer(&key, Address::new([0x03; 20]), 20, 1);
    assert!(core.add_pending(first.clone()).is_success());
    assert!(core.add_pending(second.clone()).is_success());

    let template = core.block_template();
    assert_eq!(template.depth(), 1);
    assert_eq!(template.prev_hash(), &core.top_hash());
    assert_eq!(template.nonce(), 0);
    assert_eq!(template.coinbase(), core.node_address());
    let hashes: Vec<H256> = template.transactions().iter().map(Transaction::hash).collect();
    assert_eq!(hashes, vec![first.hash(), second.hash()]);

    // The template is advisory; sealing it with a nonce makes a valid block.
    let mined = template.with_nonce(424_242);
    assert!(core.try_add_block(&mined));
    assert_eq!(core.pending_count(), 0);
}

#[test]
fn failed_block_application_is_atomic() {
    let (key_a, a) = keyed_account();
    let (key_b, b) = keyed_account();
    let core = seeded_core(Arc::new(basalt_vm::NoVm), &[(a, 1000), (b, 5)], &[]);

    let good = signed_transfer(&key_a, Address::new([0x02; 20]), 100, 10);
    // B cannot cover amount + fee; this rejects the whole block.
    let broke = signed_transfer(&key_b, Address::new([0x03; 20]), 4, 2);
    let block = block_with(&core, vec![good.clone(), broke]);

    assert!(!core.try_add_block(&block));
    assert_eq!(core.top_depth(), 0);
    assert_eq!(balance_of(&core, &a), Balance::from(1000u64));
    assert_eq!(balance_of(&core, &b), Balance::from(5u64));
    assert!(balance_of(&core, &COINBASE).is_zero());
    assert!(core.find_transaction(&good.hash()).is_none());
}

#[test]
fn balance_conservation_across_a_block() {
    let (key, a) = keyed_account();
    let core = seeded_core(Arc::new(basalt_vm::NoVm), &[(a, 1000)], &[]);

    let block = block_with(
        &core,
        vec![
            signed_transfer(&key, Address::new([0x02; 20]), 100, 10),
            signed_transfer(&key, Address::new([0x03; 20]), 200, 20),
        ],
    );
    assert!(core.try_add_block(&block));

    let total = balance_of(&core, &a)
        + balance_of(&core, &Address::new([0x02; 20]))
        + balance_of(&core, &Address::new([0x03; 20]))
        + balance_of(&core, &COINBASE);
    assert_eq!(total, Balance::from(1000u64));
}

#[test]
fn block_added_observer_fires_after_commitment() {
    let (key, a) = keyed_account();
    let core = seeded_core(Arc::new(basalt_vm::NoVm), &[(a, 1000)], &[]);

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen2 = Arc::clone(&seen);
    let _sub = core.subscribe_block_added(move |block| {
        seen2.lock().push(block.hash());
    });

    let block = block_with(&core, vec![signed_transfer(&key, Address::new([2; 20]), 1, 1)]);
    assert!(core.try_add_block(&block));
    assert_eq!(seen.lock().as_slice(), &[block.hash()]);

    // A rejected block announces nothing.
    let bad = Block::new(9, H256::NIL, 0, COINBASE, TransactionsSet::new());
    assert!(!core.try_add_block(&bad));
    assert_eq!(seen.lock().len(), 1);
}
