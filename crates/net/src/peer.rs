//! The per-connection peer state machine.
//!
//! A peer session moves `JustEstablished -> RequestedBlocks -> Synchronised`.
//! Blocks ahead of our tip are buffered per peer and their parents requested
//! until the gap closes, then applied oldest-first. Malformed frames close
//! the session; a rejected transaction does not, but a block that cannot be
//! linked after sync does.

use std::sync::Arc;

use basalt_types::Block;
use tokio::net::tcp::OwnedReadHalf;
use tracing::{debug, trace, warn};

use crate::host::{Host, PeerHandle};
use crate::message::{read_frame, Message};

/// Protocol state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Transport is up, handshake not yet processed.
    JustEstablished,
    /// We are requesting ancestors to close a gap.
    RequestedBlocks,
    /// Our tip and the peer's tip are linked.
    Synchronised,
}

pub(crate) struct Peer {
    host: Arc<Host>,
    handle: Arc<PeerHandle>,
    state: PeerState,
    sync_blocks: Vec<Block>,
}

impl Peer {
    /// Runs the session until the peer disconnects, misbehaves or is
    /// dropped by the heartbeat.
    pub(crate) async fn run(host: Arc<Host>, handle: Arc<PeerHandle>, mut reader: OwnedReadHalf) {
        let mut peer = Peer {
            host,
            handle,
            state: PeerState::JustEstablished,
            sync_blocks: Vec::new(),
        };

        // Both sides introduce themselves immediately.
        peer.handle.send(Message::Handshake {
            address: peer.host.ctx().node_address(),
            top_block: peer.host.ctx().top_block(),
            public_port: Some(peer.host.public_port()),
        });

        loop {
            match read_frame(&mut reader).await {
                Ok(msg) => {
                    peer.handle.touch();
                    if !peer.on_message(msg) {
                        break;
                    }
                }
                Err(error) => {
                    debug!(peer = %peer.handle.remote, %error, "session read failed");
                    break;
                }
            }
        }

        let id = peer.handle.id;
        peer.host.remove_peer(id);
    }

    /// Handles one message. Returning `false` closes the session.
    fn on_message(&mut self, msg: Message) -> bool {
        match msg {
            Message::Handshake {
                address,
                top_block,
                public_port,
            } => self.on_handshake(address, top_block, public_port),
            Message::Ping => {
                self.handle.send(Message::Pong);
                true
            }
            Message::Pong => true,
            Message::Transaction(tx) => {
                let hash = tx.hash();
                // The sender obviously has it; never echo it back.
                self.handle.mark_tx_known(&hash);
                let status = self.host.ctx().add_pending(tx.clone());
                if status.is_success() {
                    self.host.broadcast_transaction(&tx);
                } else {
                    // Not a peer fault.
                    trace!(hash = %hash, %status, "gossiped transaction refused");
                }
                true
            }
            Message::Block(block) => self.on_block(block),
            Message::GetBlock(hash) => {
                match self.host.ctx().find_block(&hash) {
                    Some(block) => self.handle.send(Message::Block(block)),
                    None => self.handle.send(Message::BlockNotFound(hash)),
                }
                true
            }
            Message::BlockNotFound(hash) => {
                if self.state == PeerState::RequestedBlocks {
                    // The peer advertised a chain it cannot substantiate.
                    warn!(peer = %self.handle.remote, %hash, "sync parent unavailable");
                    return false;
                }
                true
            }
            Message::GetInfo => {
                self.handle.send(Message::Info {
                    top_hash: self.host.ctx().top_hash(),
                    peers: self.host.peer_endpoints(),
                });
                true
            }
            Message::Info { top_hash, peers } => {
                trace!(peer = %self.handle.remote, %top_hash, peers = peers.len(), "peer info");
                for endpoint in peers {
                    self.host.connect_if_new(endpoint);
                }
                true
            }
            Message::Lookup { target, alpha } => {
                self.handle.send(Message::LookupResult {
                    target,
                    peers: self.host.closest_known(&target, alpha as usize),
                });
                true
            }
            Message::LookupResult { target, peers } => {
                self.host.resolve_lookup(&target, peers);
                true
            }
            Message::Close => false,
        }
    }

    fn on_handshake(
        &mut self,
        address: basalt_types::Address,
        top_block: Block,
        public_port: Option<u16>,
    ) -> bool {
        self.handle.set_identity(address, public_port);
        debug!(
            peer = %self.handle.remote,
            %address,
            their_depth = top_block.depth(),
            "handshake"
        );
        if top_block.depth() > self.host.ctx().top_depth() {
            self.on_block(top_block)
        } else {
            self.state = PeerState::Synchronised;
            true
        }
    }

    fn on_block(&mut self, block: Block) -> bool {
        let our_top = self.host.ctx().top_depth();
        let depth = block.depth();

        if depth == our_top + 1 {
            self.handle.mark_block_known(&block.hash());
            if self.host.ctx().try_add_block(&block) {
                self.host.broadcast_block(&block);
                self.drain_sync_list()
            } else if self.state == PeerState::RequestedBlocks {
                // The chain this peer fed us does not link.
                warn!(peer = %self.handle.remote, hash = %block.hash(), "unlinkable sync block");
                false
            } else {
                // A competing block at the same height; longest chain wins
                // later.
                true
            }
        } else if depth > our_top + 1 {
            let parent = *block.prev_hash();
            let parent_buffered = self.sync_blocks.iter().any(|b| b.hash() == parent);
            if !self.sync_blocks.iter().any(|b| b.hash() == block.hash()) {
                self.sync_blocks.push(block);
            }
            self.state = PeerState::RequestedBlocks;
            if !parent_buffered {
                self.handle.send(Message::GetBlock(parent));
            }
            true
        } else {
            // Older than our tip or a duplicate; nothing to do.
            true
        }
    }

    /// Applies buffered sync blocks oldest-first while they keep linking.
    fn drain_sync_list(&mut self) -> bool {
        self.sync_blocks.sort_by_key(Block::depth);
        while let Some(next) = self.sync_blocks.first() {
            let wanted = self.host.ctx().top_depth() + 1;
            if next.depth() < wanted {
                self.sync_blocks.remove(0);
                continue;
            }
            if next.depth() > wanted {
                // Still a gap; keep waiting for parents.
                return true;
            }
            let block = self.sync_blocks.remove(0);
            self.handle.mark_block_known(&block.hash());
            if !self.host.ctx().try_add_block(&block) {
                warn!(peer = %self.handle.remote, hash = %block.hash(), "sync block failed to apply");
                return false;
            }
            self.host.broadcast_block(&block);
        }
        self.state = PeerState::Synchronised;
        true
    }
}
