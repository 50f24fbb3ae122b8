//! # Basalt RPC Surface
//!
//! The query/submit interface the node exposes to external clients,
//! independent of any transport. A WebSocket or HTTP adapter turns its wire
//! requests into [`Request`] values, hands them to [`Service::handle`] and
//! serializes the [`Response`].
//!
//! The service talks to the engine through the [`NodeApi`] trait and bounds
//! concurrent work with a semaphore, so a flood of queries cannot starve
//! block application.

#![warn(missing_docs)]
#![deny(unsafe_code)]

use std::sync::Arc;

use basalt_types::{
    Account, Address, Balance, Block, Transaction, TransactionStatus, ViewCall, H256,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Semaphore};
use tracing::debug;

/// Errors surfaced to RPC clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RpcError {
    /// The request was malformed or referenced unknown entities.
    #[error("validation: {0}")]
    Validation(String),
    /// The requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A view call reverted; the Base64 revert payload is attached.
    #[error("reverted: {0}")]
    Reverted(String),
    /// A view call failed in the interpreter.
    #[error("execution failed")]
    Failed,
}

/// What the service needs from the engine. Implemented by the node.
pub trait NodeApi: Send + Sync {
    /// Chain tip and node identity summary.
    fn node_info(&self) -> NodeInfo;
    /// Account record and, for contracts, its storage slots.
    fn account(&self, addr: &Address) -> Option<(Account, Vec<(H256, H256)>)>;
    /// Block by hash.
    fn block_by_hash(&self, hash: &H256) -> Option<Block>;
    /// Block by depth.
    fn block_by_number(&self, number: u64) -> Option<Block>;
    /// Committed transaction by hash.
    fn transaction(&self, hash: &H256) -> Option<Transaction>;
    /// Recorded outcome of a transaction.
    fn transaction_status(&self, hash: &H256) -> Option<TransactionStatus>;
    /// Synchronous admission into the pending pool.
    fn push_transaction(&self, tx: Transaction) -> TransactionStatus;
    /// Side-effect-free contract call.
    fn call_view(&self, call: ViewCall) -> Result<Vec<u8>, RpcError>;
}

/// Summary returned by `get_node_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Hash of the current top block.
    pub top_block_hash: H256,
    /// Depth of the current top block.
    pub top_block_number: u64,
    /// Version of this API.
    pub api_version: u32,
    /// Number of connected peers.
    pub peers_count: usize,
}

/// Account representation served to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccountDto {
    /// An externally owned account.
    Client {
        /// The account address, Base58.
        address: Address,
        /// Balance, decimal string.
        balance: Balance,
        /// Transaction counter.
        nonce: u64,
        /// Hashes of transactions that touched the account.
        tx_hashes: Vec<H256>,
    },
    /// A contract account.
    Contract {
        /// The account address, Base58.
        address: Address,
        /// Balance, decimal string.
        balance: Balance,
        /// Runtime code, hex.
        code: String,
        /// ABI blob, hex.
        abi: String,
        /// Storage slots, sorted by key.
        storage: Vec<(H256, H256)>,
    },
}

impl AccountDto {
    fn assemble(address: Address, account: Account, storage: Vec<(H256, H256)>) -> Self {
        match account {
            Account::Client {
                balance,
                nonce,
                tx_hashes,
            } => Self::Client {
                address,
                balance,
                nonce,
                tx_hashes,
            },
            Account::Contract { balance, code, abi } => Self::Contract {
                address,
                balance,
                code: hex::encode(&code),
                abi: hex::encode(&abi),
                storage,
            },
        }
    }
}

/// One RPC request, transport-decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Request {
    /// `get_node_info`.
    GetNodeInfo,
    /// `get_account(address)`.
    GetAccount(Address),
    /// `get_block(hash)`.
    GetBlockByHash(H256),
    /// `get_block(number)`.
    GetBlockByNumber(u64),
    /// `get_transaction(hash)`.
    GetTransaction(H256),
    /// `get_transaction_status(hash)`.
    GetTransactionStatus(H256),
    /// `push_transaction(tx)`.
    PushTransaction(Transaction),
    /// `call_view(from, to, data)`.
    CallView {
        /// Caller address presented to the contract.
        from: Address,
        /// Contract to query.
        to: Address,
        /// Calldata, hex.
        data: String,
    },
}

/// One RPC response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "value", rename_all = "snake_case")]
pub enum Response {
    /// Answer to `get_node_info`.
    NodeInfo(NodeInfo),
    /// Answer to `get_account`; `None` when the account does not exist.
    Account(Option<AccountDto>),
    /// Answer to a block query.
    Block(Option<Block>),
    /// Answer to `get_transaction`.
    Transaction(Option<Transaction>),
    /// Answer to `get_transaction_status`.
    TransactionStatus(Option<TransactionStatus>),
    /// Admission result of `push_transaction`.
    PushResult(TransactionStatus),
    /// Return bytes of `call_view`, hex.
    ViewResult(String),
    /// Any failure.
    Error(RpcError),
}

/// Events pushed to subscription channels.
#[derive(Debug, Clone)]
pub enum Event {
    /// A block was applied to the chain.
    BlockAdded(Block),
    /// An account's state changed.
    AccountChanged(Address),
}

/// The RPC service: a bounded dispatcher over a [`NodeApi`] provider.
pub struct Service<P> {
    provider: Arc<P>,
    limiter: Arc<Semaphore>,
    events: broadcast::Sender<Event>,
}

impl<P: NodeApi> Service<P> {
    /// Creates a service allowing at most `max_in_flight` concurrent calls.
    pub fn new(provider: Arc<P>, max_in_flight: usize) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            provider,
            limiter: Arc::new(Semaphore::new(max_in_flight.max(1))),
            events,
        }
    }

    /// Handles one request. Holds a concurrency permit for the duration.
    pub async fn handle(&self, request: Request) -> Response {
        let _permit = self
            .limiter
            .clone()
            .acquire_owned()
            .await
            .expect("service semaphore never closes");
        debug!(?request, "rpc request");
        self.dispatch(request)
    }

    fn dispatch(&self, request: Request) -> Response {
        match request {
            Request::GetNodeInfo => Response::NodeInfo(self.provider.node_info()),
            Request::GetAccount(address) => Response::Account(
                self.provider
                    .account(&address)
                    .map(|(account, storage)| AccountDto::assemble(address, account, storage)),
            ),
            Request::GetBlockByHash(hash) => Response::Block(self.provider.block_by_hash(&hash)),
            Request::GetBlockByNumber(number) => {
                Response::Block(self.provider.block_by_number(number))
            }
            Request::GetTransaction(hash) => Response::Transaction(self.provider.transaction(&hash)),
            Request::GetTransactionStatus(hash) => {
                Response::TransactionStatus(self.provider.transaction_status(&hash))
            }
            Request::PushTransaction(tx) => Response::PushResult(self.provider.push_transaction(tx)),
            Request::CallView { from, to, data } => {
                let data = match hex::decode(data.strip_prefix("0x").unwrap_or(&data)) {
                    Ok(data) => data,
                    Err(error) => {
                        return Response::Error(RpcError::Validation(format!(
                            "calldata is not hex: {error}"
                        )))
                    }
                };
                let call = ViewCall::new(from, to, basalt_types::unix_timestamp(), data);
                match self.provider.call_view(call) {
                    Ok(bytes) => Response::ViewResult(hex::encode(bytes)),
                    Err(error) => Response::Error(error),
                }
            }
        }
    }

    /// Opens a subscription to `block_added` / `account_changed` events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Publishes a block addition to subscribers.
    pub fn publish_block(&self, block: Block) {
        let _ = self.events.send(Event::BlockAdded(block));
    }

    /// Publishes an account change to subscribers.
    pub fn publish_account_changed(&self, address: Address) {
        let _ = self.events.send(Event::AccountChanged(address));
    }
}
