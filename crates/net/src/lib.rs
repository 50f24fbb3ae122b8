//! # Basalt Networking
//!
//! The peer-to-peer layer: accepting and dialing TCP connections, framing
//! messages, and running the per-connection peer state machine that
//! synchronizes the chain and gossips blocks and transactions.
//!
//! The layer talks to the engine through the [`NodeContext`] trait instead
//! of owning it, so the dependency points one way: peers borrow the core,
//! never the other way around.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod host;
pub mod message;
pub mod peer;

pub use host::Host;
pub use message::{read_frame, write_frame, Message, PeerInfo};

use basalt_types::{Address, Block, Transaction, TransactionStatus, H256};
use std::net::SocketAddr;

/// Result type for networking operations.
pub type Result<T> = std::result::Result<T, NetError>;

/// Errors raised by the networking layer.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Transport failure on one session; isolated to that session.
    #[error("session i/o: {0}")]
    Io(#[from] std::io::Error),

    /// A peer sent a frame that does not decode. Closes the session.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] basalt_codec::Error),

    /// A frame exceeded the 2-byte length prefix.
    #[error("message too large: {size} bytes")]
    Oversized {
        /// Encoded size that did not fit.
        size: usize,
    },

    /// A lookup was cancelled by session close or shutdown.
    #[error("lookup cancelled")]
    LookupCancelled,
}

/// What the peer layer needs from the engine.
///
/// Implemented by the node's `Core`; handed to [`Host`] as a non-owning
/// shared reference.
pub trait NodeContext: Send + Sync {
    /// This node's account address, used for lookups and handshakes.
    fn node_address(&self) -> Address;

    /// The current top block.
    fn top_block(&self) -> Block;

    /// Depth of the current top block.
    fn top_depth(&self) -> u64;

    /// Hash of the current top block.
    fn top_hash(&self) -> H256;

    /// Tries to extend the chain; `false` means the block did not link or
    /// did not validate.
    fn try_add_block(&self, block: &Block) -> bool;

    /// Admits a transaction into the pending pool.
    fn add_pending(&self, tx: Transaction) -> TransactionStatus;

    /// Looks up a block by hash.
    fn find_block(&self, hash: &H256) -> Option<Block>;
}

/// Configuration of the peer host.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Address to listen on.
    pub listen_addr: SocketAddr,
    /// Port advertised for incoming connections.
    pub public_port: u16,
    /// Seed peers dialed at startup.
    pub seeds: Vec<SocketAddr>,
    /// Heartbeat period; peers idle longer than this are dropped.
    pub ping_interval: std::time::Duration,
}

impl HostConfig {
    /// A config listening on `listen_addr` with no seeds.
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            public_port: listen_addr.port(),
            listen_addr,
            seeds: Vec::new(),
            ping_interval: std::time::Duration::from_secs(30),
        }
    }
}
