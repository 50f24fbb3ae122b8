//! Tests for the RPC service dispatcher.

use std::sync::Arc;

use basalt_rpc::{Event, NodeApi, NodeInfo, Request, Response, RpcError, Service};
use basalt_types::{
    Account, Address, Balance, Block, Transaction, TransactionStatus, ViewCall, H256,
};
use parking_lot::Mutex;

struct MockProvider {
    pushed: Mutex<Vec<Transaction>>,
}

impl MockProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            pushed: Mutex::new(Vec::new()),
        })
    }
}

impl NodeApi for MockProvider {
    fn node_info(&self) -> NodeInfo {
        NodeInfo {
            top_block_hash: Block::genesis().hash(),
            top_block_number: 0,
            api_version: 1,
            peers_count: 2,
        }
    }

    fn account(&self, addr: &Address) -> Option<(Account, Vec<(H256, H256)>)> {
        if addr == &Address::new([1; 20]) {
            Some((
                Account::Client {
                    balance: Balance::from(42u64),
                    nonce: 1,
                    tx_hashes: vec![],
                },
                Vec::new(),
            ))
        } else {
            None
        }
    }

    fn block_by_hash(&self, hash: &H256) -> Option<Block> {
        (*hash == Block::genesis().hash()).then(Block::genesis)
    }

    fn block_by_number(&self, number: u64) -> Option<Block> {
        (number == 0).then(Block::genesis)
    }

    fn transaction(&self, _hash: &H256) -> Option<Transaction> {
        None
    }

    fn transaction_status(&self, _hash: &H256) -> Option<TransactionStatus> {
        None
    }

    fn push_transaction(&self, tx: Transaction) -> TransactionStatus {
        self.pushed.lock().push(tx);
        TransactionStatus::success(Balance::zero(), "")
    }

    fn call_view(&self, call: ViewCall) -> Result<Vec<u8>, RpcError> {
        if call.contract_address() == &Address::new([9; 20]) {
            Ok(call.data().to_vec())
        } else {
            Err(RpcError::NotFound("no such contract".into()))
        }
    }
}

#[tokio::test]
async fn node_info_reports_the_tip() {
    let service = Service::new(MockProvider::new(), 4);
    match service.handle(Request::GetNodeInfo).await {
        Response::NodeInfo(info) => {
            assert_eq!(info.top_block_number, 0);
            assert_eq!(info.peers_count, 2);
            assert_eq!(info.api_version, 1);
        }
        other => panic!("unexpected response {other:?}"),
    }
}

#[tokio::test]
async fn unknown_account_is_none() {
    let service = Service::new(MockProvider::new(), 4);
    match service.handle(Request::GetAccount(Address::new([7; 20]))).await {
        Response::Account(None) => {}
        other => panic!("unexpected response {other:?}"),
    }
    match service.handle(Request::GetAccount(Address::new([1; 20]))).await {
        Response::Account(Some(_)) => {}
        other => panic!("unexpected response {other:?}"),
    }
}

#[tokio::test]
async fn view_call_round_trips_hex() {
    let service = Service::new(MockProvider::new(), 4);
    let response = service
        .handle(Request::CallView {
            from: Address::new([1; 20]),
            to: Address::new([9; 20]),
            data: "0xdeadbeef".into(),
        })
        .await;
    assert_eq!(response, Response::ViewResult("deadbeef".into()));

    let response = service
        .handle(Request::CallView {
            from: Address::new([1; 20]),
            to: Address::new([9; 20]),
            data: "zz".into(),
        })
        .await;
    assert!(matches!(response, Response::Error(RpcError::Validation(_))));
}

#[tokio::test]
async fn subscription_sees_published_events() {
    let service = Service::new(MockProvider::new(), 4);
    let mut events = service.subscribe();

    service.publish_block(Block::genesis());
    service.publish_account_changed(Address::new([1; 20]));

    match events.recv().await.unwrap() {
        Event::BlockAdded(block) => assert_eq!(block, Block::genesis()),
        other => panic!("unexpected event {other:?}"),
    }
    match events.recv().await.unwrap() {
        Event::AccountChanged(addr) => assert_eq!(addr, Address::new([1; 20])),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn response_serde_is_stable() {
    let service = Service::new(MockProvider::new(), 4);
    let response = service.handle(Request::GetBlockByNumber(0)).await;
    let json = serde_json::to_string(&response).unwrap();
    let decoded: Response = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, response);
}
