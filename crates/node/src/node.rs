//! Node orchestration: wires the core to networking and the RPC service.
//!
//! The dependency shape is deliberate: the network host and the RPC service
//! borrow the core through trait objects; the core owns nothing above it.
//! Gossip wiring goes through weak observer subscriptions, so dropping the
//! node tears everything down without reference cycles.

use std::sync::Arc;

use basalt_config::Config;
use basalt_net::{Host, HostConfig, NodeContext};
use basalt_rpc::{NodeApi, NodeInfo, RpcError, Service};
use basalt_types::{
    Account, Address, Block, Transaction, TransactionStatus, ViewCall, H256,
};
use tracing::info;

use crate::core::{Core, API_VERSION};
use crate::observer::Subscription;
use crate::{NodeError, Result};

impl NodeContext for Core {
    fn node_address(&self) -> Address {
        *Core::node_address(self)
    }

    fn top_block(&self) -> Block {
        Core::top_block(self)
    }

    fn top_depth(&self) -> u64 {
        Core::top_depth(self)
    }

    fn top_hash(&self) -> H256 {
        Core::top_hash(self)
    }

    fn try_add_block(&self, block: &Block) -> bool {
        Core::try_add_block(self, block)
    }

    fn add_pending(&self, tx: Transaction) -> TransactionStatus {
        Core::add_pending(self, tx)
    }

    fn find_block(&self, hash: &H256) -> Option<Block> {
        Core::find_block(self, hash)
    }
}

/// Provider adapter between the RPC service and the engine.
pub struct RpcBridge {
    core: Arc<Core>,
    host: Arc<Host>,
}

impl NodeApi for RpcBridge {
    fn node_info(&self) -> NodeInfo {
        NodeInfo {
            top_block_hash: self.core.top_hash(),
            top_block_number: self.core.top_depth(),
            api_version: API_VERSION,
            peers_count: self.host.peer_count(),
        }
    }

    fn account(&self, addr: &Address) -> Option<(Account, Vec<(H256, H256)>)> {
        let account = self.core.get_account(addr)?;
        let storage = if account.is_contract() {
            self.core.account_storage(addr)
        } else {
            Vec::new()
        };
        Some((account, storage))
    }

    fn block_by_hash(&self, hash: &H256) -> Option<Block> {
        self.core.find_block(hash)
    }

    fn block_by_number(&self, number: u64) -> Option<Block> {
        let hash = self.core.find_block_hash(number)?;
        self.core.find_block(&hash)
    }

    fn transaction(&self, hash: &H256) -> Option<Transaction> {
        self.core.find_transaction(hash)
    }

    fn transaction_status(&self, hash: &H256) -> Option<TransactionStatus> {
        self.core.transaction_output(hash)
    }

    fn push_transaction(&self, tx: Transaction) -> TransactionStatus {
        self.core.add_pending(tx)
    }

    fn call_view(&self, call: ViewCall) -> std::result::Result<Vec<u8>, RpcError> {
        match self.core.call_view(&call) {
            Ok(bytes) => Ok(bytes.to_vec()),
            Err(NodeError::Validation(message)) => Err(RpcError::Validation(message)),
            Err(NodeError::NotFound(what)) => Err(RpcError::NotFound(what)),
            Err(NodeError::ViewReverted(payload)) => Err(RpcError::Reverted(payload)),
            Err(_) => Err(RpcError::Failed),
        }
    }
}

/// A running node: core, network host, RPC service and their wiring.
pub struct Node {
    core: Arc<Core>,
    host: Arc<Host>,
    rpc: Arc<Service<RpcBridge>>,
    _block_sub: Subscription<Block>,
    _pending_sub: Subscription<Transaction>,
}

impl Node {
    /// Starts networking and the RPC service around an opened core.
    pub async fn start(config: &Config, core: Arc<Core>) -> Result<Self> {
        let host_config = HostConfig {
            listen_addr: config.net.listen_addr,
            public_port: config.net.advertised_port(),
            seeds: config.net.nodes.clone(),
            ping_interval: std::time::Duration::from_secs(30),
        };
        let host = basalt_net::Host::spawn(host_config, Arc::clone(&core) as Arc<dyn NodeContext>)
            .await
            .map_err(|e| NodeError::Validation(format!("network start failed: {e}")))?;

        let rpc = Arc::new(Service::new(
            Arc::new(RpcBridge {
                core: Arc::clone(&core),
                host: Arc::clone(&host),
            }),
            config.rpc.max_in_flight,
        ));

        // Locally admitted transactions fan out to every peer; peer-received
        // ones were already marked on their origin session, so nothing
        // echoes back.
        let gossip_host = Arc::clone(&host);
        let pending_sub = core.subscribe_pending_added(move |tx| {
            gossip_host.broadcast_transaction(tx);
        });

        // Freshly applied blocks go to peers and to RPC subscribers, along
        // with change notifications for every touched account.
        let block_host = Arc::clone(&host);
        let block_rpc = Arc::clone(&rpc);
        let block_sub = core.subscribe_block_added(move |block| {
            block_host.broadcast_block(block);
            block_rpc.publish_block(block.clone());
            block_rpc.publish_account_changed(*block.coinbase());
            for tx in block.transactions() {
                block_rpc.publish_account_changed(*tx.from());
                if !tx.to().is_null() {
                    block_rpc.publish_account_changed(*tx.to());
                }
            }
        });

        info!(
            address = %core.node_address(),
            listen = %host.listen_addr(),
            rpc = %config.rpc.address,
            "node started"
        );
        Ok(Self {
            core,
            host,
            rpc,
            _block_sub: block_sub,
            _pending_sub: pending_sub,
        })
    }

    /// The engine.
    pub fn core(&self) -> &Arc<Core> {
        &self.core
    }

    /// The network host.
    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    /// The RPC service an external transport serves.
    pub fn rpc(&self) -> &Arc<Service<RpcBridge>> {
        &self.rpc
    }
}
