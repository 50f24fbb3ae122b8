//! The peer host: listener, dialer, heartbeat, gossip fan-out and lookups.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use basalt_types::{Address, Block, Transaction, H256};
use parking_lot::{Mutex, RwLock};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::message::{write_frame, xor_distance, Message, PeerInfo};
use crate::peer::Peer;
use crate::{HostConfig, NetError, NodeContext, Result};

/// Shared per-connection handle: the outbound queue plus the bookkeeping the
/// host needs about the session.
pub struct PeerHandle {
    /// Session identifier, unique within this host.
    pub id: u64,
    /// Remote transport endpoint of the connection.
    pub remote: SocketAddr,
    outbound: mpsc::UnboundedSender<Message>,
    identity: RwLock<Option<PeerIdentity>>,
    last_seen: Mutex<Instant>,
    known_txs: Mutex<HashSet<H256>>,
    known_blocks: Mutex<HashSet<H256>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Debug, Clone, Copy)]
struct PeerIdentity {
    address: Address,
    server_endpoint: Option<SocketAddr>,
}

impl PeerHandle {
    /// Queues a message for this peer. Sends to a closing peer are dropped.
    pub fn send(&self, msg: Message) {
        let _ = self.outbound.send(msg);
    }

    /// Updates the liveness timestamp.
    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    fn idle_for(&self) -> std::time::Duration {
        self.last_seen.lock().elapsed()
    }

    /// Records the peer identity from its handshake.
    pub fn set_identity(&self, address: Address, public_port: Option<u16>) {
        let server_endpoint = public_port.map(|port| SocketAddr::new(self.remote.ip(), port));
        *self.identity.write() = Some(PeerIdentity {
            address,
            server_endpoint,
        });
    }

    /// The peer's account address, once the handshake arrived.
    pub fn address(&self) -> Option<Address> {
        self.identity.read().map(|i| i.address)
    }

    /// The endpoint the peer accepts connections on, when advertised.
    pub fn server_endpoint(&self) -> Option<SocketAddr> {
        self.identity.read().and_then(|i| i.server_endpoint)
    }

    /// Marks a transaction as known to this peer. Returns `true` when it
    /// was not known before.
    pub fn mark_tx_known(&self, hash: &H256) -> bool {
        self.known_txs.lock().insert(*hash)
    }

    /// Marks a block as known to this peer. Returns `true` when it was not
    /// known before.
    pub fn mark_block_known(&self, hash: &H256) -> bool {
        self.known_blocks.lock().insert(*hash)
    }

    fn abort(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// The networking host: owns the listener, the peer table, the heartbeat
/// and in-flight lookups.
pub struct Host {
    config: HostConfig,
    ctx: Arc<dyn NodeContext>,
    peers: RwLock<HashMap<u64, Arc<PeerHandle>>>,
    next_peer_id: AtomicU64,
    lookups: Mutex<HashMap<Address, Vec<oneshot::Sender<Vec<PeerInfo>>>>>,
}

impl Host {
    /// Binds the listener, dials the seed peers and starts the heartbeat.
    pub async fn spawn(config: HostConfig, ctx: Arc<dyn NodeContext>) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        let local = listener.local_addr()?;
        let mut config = config;
        // Resolve an ephemeral port request to the port actually bound.
        config.listen_addr = local;
        if config.public_port == 0 {
            config.public_port = local.port();
        }
        info!(listen = %local, seeds = config.seeds.len(), "network host up");

        let host = Arc::new(Self {
            config,
            ctx,
            peers: RwLock::new(HashMap::new()),
            next_peer_id: AtomicU64::new(1),
            lookups: Mutex::new(HashMap::new()),
        });

        let accept_host = Arc::clone(&host);
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote)) => {
                        debug!(%remote, "peer accepted");
                        accept_host.start_session(stream, remote);
                    }
                    Err(error) => {
                        warn!(%error, "accept failed");
                    }
                }
            }
        });

        for seed in host.config.seeds.clone() {
            host.connect(seed);
        }

        let beat_host = Arc::clone(&host);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(beat_host.config.ping_interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                beat_host.heartbeat();
            }
        });

        Ok(host)
    }

    pub(crate) fn ctx(&self) -> &dyn NodeContext {
        &*self.ctx
    }

    pub(crate) fn public_port(&self) -> u16 {
        self.config.public_port
    }

    /// The local listen address.
    pub fn listen_addr(&self) -> SocketAddr {
        self.config.listen_addr
    }

    /// Dials a peer.
    pub fn connect(self: &Arc<Self>, endpoint: SocketAddr) {
        let host = Arc::clone(self);
        tokio::spawn(async move {
            match TcpStream::connect(endpoint).await {
                Ok(stream) => {
                    debug!(%endpoint, "peer connected");
                    host.start_session(stream, endpoint);
                }
                Err(error) => {
                    warn!(%endpoint, %error, "dial failed");
                }
            }
        });
    }

    /// Dials an endpoint unless a session with it already exists.
    pub(crate) fn connect_if_new(self: &Arc<Self>, endpoint: SocketAddr) {
        if endpoint == self.config.listen_addr {
            return;
        }
        let known = self
            .peers
            .read()
            .values()
            .any(|p| p.remote == endpoint || p.server_endpoint() == Some(endpoint));
        if !known {
            self.connect(endpoint);
        }
    }

    fn start_session(self: &Arc<Self>, stream: TcpStream, remote: SocketAddr) {
        let id = self.next_peer_id.fetch_add(1, Ordering::Relaxed);
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = Arc::new(PeerHandle {
            id,
            remote,
            outbound: tx,
            identity: RwLock::new(None),
            last_seen: Mutex::new(Instant::now()),
            known_txs: Mutex::new(HashSet::new()),
            known_blocks: Mutex::new(HashSet::new()),
            tasks: Mutex::new(Vec::new()),
        });

        let writer = tokio::spawn(write_loop(write_half, rx));
        let reader = tokio::spawn(Peer::run(
            Arc::clone(self),
            Arc::clone(&handle),
            read_half,
        ));
        *handle.tasks.lock() = vec![writer, reader];

        self.peers.write().insert(id, handle);
    }

    /// Tears down one session. Idempotent.
    pub(crate) fn remove_peer(&self, id: u64) {
        if let Some(handle) = self.peers.write().remove(&id) {
            debug!(peer = %handle.remote, "session closed");
            handle.abort();
        }
        if self.peers.read().is_empty() {
            // No peer left to answer; cancel whatever is in flight.
            self.lookups.lock().clear();
        }
    }

    fn heartbeat(&self) {
        let stale: Vec<u64> = self
            .peers
            .read()
            .values()
            .filter(|p| p.idle_for() > self.config.ping_interval)
            .map(|p| p.id)
            .collect();
        for id in stale {
            debug!(peer = id, "dropping idle peer");
            self.remove_peer(id);
        }
        for peer in self.peers.read().values() {
            peer.send(Message::Ping);
        }
    }

    // =========================================================================
    // Gossip
    // =========================================================================

    /// Sends a transaction to every peer that has not seen it yet.
    pub fn broadcast_transaction(&self, tx: &Transaction) {
        let hash = tx.hash();
        let mut sent = 0usize;
        for peer in self.peers.read().values() {
            if peer.mark_tx_known(&hash) {
                peer.send(Message::Transaction(tx.clone()));
                sent += 1;
            }
        }
        trace!(%hash, sent, "transaction gossiped");
    }

    /// Sends a block to every peer that has not seen it yet.
    pub fn broadcast_block(&self, block: &Block) {
        let hash = block.hash();
        let mut sent = 0usize;
        for peer in self.peers.read().values() {
            if peer.mark_block_known(&hash) {
                peer.send(Message::Block(block.clone()));
                sent += 1;
            }
        }
        trace!(%hash, sent, "block gossiped");
    }

    // =========================================================================
    // Peer set queries
    // =========================================================================

    /// Number of live sessions.
    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Advertised endpoints of the connected peers.
    pub fn peer_endpoints(&self) -> Vec<SocketAddr> {
        self.peers
            .read()
            .values()
            .filter_map(|p| p.server_endpoint())
            .collect()
    }

    /// Up to `alpha` identified peers closest to `target` by XOR distance.
    pub(crate) fn closest_known(&self, target: &Address, alpha: usize) -> Vec<PeerInfo> {
        let mut candidates: Vec<PeerInfo> = self
            .peers
            .read()
            .values()
            .filter_map(|p| {
                Some(PeerInfo {
                    endpoint: p.server_endpoint()?,
                    address: p.address()?,
                })
            })
            .collect();
        candidates.sort_by_key(|info| xor_distance(&info.address, target));
        candidates.truncate(alpha);
        candidates
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Resolves the peers closest to `target`, asking up to `alpha` of our
    /// closest connected peers. Concurrent lookups for the same target share
    /// one flight; session loss cancels outstanding flights.
    pub async fn lookup(&self, target: Address, alpha: u8) -> Result<Vec<PeerInfo>> {
        let (tx, rx) = oneshot::channel();
        let start_flight = {
            let mut lookups = self.lookups.lock();
            let waiters = lookups.entry(target).or_default();
            waiters.push(tx);
            waiters.len() == 1
        };

        if start_flight {
            let queried: Vec<Arc<PeerHandle>> = {
                let peers = self.peers.read();
                let mut with_identity: Vec<(Address, Arc<PeerHandle>)> = peers
                    .values()
                    .filter_map(|p| Some((p.address()?, Arc::clone(p))))
                    .collect();
                with_identity.sort_by_key(|(addr, _)| xor_distance(addr, &target));
                with_identity
                    .into_iter()
                    .take(alpha.max(1) as usize)
                    .map(|(_, p)| p)
                    .collect()
            };
            if queried.is_empty() {
                self.lookups.lock().remove(&target);
                return Err(NetError::LookupCancelled);
            }
            for peer in queried {
                peer.send(Message::Lookup { target, alpha });
            }
        }

        rx.await.map_err(|_| NetError::LookupCancelled)
    }

    /// Feeds a lookup answer to every coalesced waiter for its target.
    pub(crate) fn resolve_lookup(&self, target: &Address, peers: Vec<PeerInfo>) {
        let waiters = self.lookups.lock().remove(target).unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(peers.clone());
        }
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(msg) = rx.recv().await {
        if let Err(error) = write_frame(&mut writer, &msg).await {
            debug!(%error, "session write failed");
            break;
        }
    }
}
