use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::seq::IteratorRandom;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vc_blockchain::Blockchain;
use vc_merkle::{MerkleProof, MerkleTree};
use vc_net::{
    load_neighbors, read_frame, request, send, write_frame, Envelope, HeartbeatData, MessageType,
    MinerInfo, PeerList, RegisterData,
};
use vc_transaction::{KeyPair, SignatureVerifier, Transaction};

use crate::{config::PeerConfig, error::PeerError, event::NodeEvent};

/// How often the peer reports its chain to the tracker.
pub(crate) const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Snapshot returned by [`Node::chain_info`].
#[derive(Debug, Clone, Serialize)]
pub struct ChainInfo {
    pub chain_length: usize,
    pub last_hash: String,
    pub pending_count: usize,
    pub mining: bool,
}

/// Inclusion proof for a committed vote, returned by [`Node::vote_proof`].
#[derive(Debug, Clone)]
pub struct VoteProof {
    /// Height of the block sealing the vote.
    pub block_index: u64,
    /// That block's merkle root; the proof folds up to it.
    pub merkle_root: String,
    pub proof: MerkleProof,
}

/// A votechain peer: holds a chain and mempool, mines pending
/// transactions, gossips blocks and transactions to its topology
/// neighbors, and reports to the tracker via heartbeats.
///
/// Received blocks and transactions are NOT re-broadcast; the static
/// topology is presumed to flood the network, so only clique (or
/// transitively closed) topologies reach every peer.
pub struct Node {
    /// `host:port` of the listener; doubles as this node's peer id.
    id: String,
    config: PeerConfig,

    /// Demo identity; the public key is this node's voter id.
    keypair: KeyPair,
    verifier: Arc<dyn SignatureVerifier>,

    /// Chain + mempool. Locked briefly; never across I/O.
    pub(crate) chain: Mutex<Blockchain>,

    /// Last roster pushed by the tracker, keyed by peer id.
    roster: Mutex<PeerList>,

    /// Outbound gossip neighbors from the topology file.
    neighbors: Vec<String>,

    /// Last-known miner credentials from the tracker.
    pub(crate) credentials: Mutex<Option<MinerInfo>>,

    pub(crate) running: AtomicBool,
    pub(crate) mining: AtomicBool,
    auto_mine: AtomicBool,
    shutdown: Notify,

    events: mpsc::UnboundedSender<NodeEvent>,
}

impl Node {
    /// Bind the listener, register with the tracker, and spawn the
    /// background tasks (accept loop, heartbeat producer).
    ///
    /// Returns the node together with a receiver for [`NodeEvent`]s that
    /// the calling application can process independently.
    pub async fn start(
        config: PeerConfig,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<NodeEvent>), PeerError> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let port = listener.local_addr()?.port();
        let id = format!("{}:{port}", config.host);

        let neighbors = load_neighbors(&config.topology_file, &id);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let node = Arc::new(Self {
            id: id.clone(),
            keypair: KeyPair::generate(),
            verifier,
            chain: Mutex::new(Blockchain::new()),
            roster: Mutex::new(PeerList::new()),
            neighbors,
            credentials: Mutex::new(None),
            running: AtomicBool::new(true),
            mining: AtomicBool::new(false),
            auto_mine: AtomicBool::new(config.auto_mine),
            shutdown: Notify::new(),
            events: event_tx,
            config,
        });

        info!("peer {id} listening");

        node.register_with_tracker(port).await;
        node.refresh_credentials().await;

        tokio::spawn(accept_loop(node.clone(), listener));
        tokio::spawn(heartbeat_loop(node.clone()));

        Ok((node, event_rx))
    }

    /// This node's `host:port` id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// This node's voter id (its demo public key).
    pub fn voter_id(&self) -> &str {
        &self.keypair.public_key
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the node: background loops exit, the listener closes, and an
    /// in-flight nonce search aborts between attempts.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();
        info!("peer {} stopped", self.id);
    }

    // ── Public operations ────────────────────────────────────────────────

    /// Cast this node's single vote for `choice`.
    ///
    /// Synthesizes a signed transaction, admits it locally, gossips it to
    /// the topology neighbors, and (with auto-mine on) starts mining.
    /// Returns `false` when this voter has already voted or the signature
    /// fails verification.
    pub async fn submit_vote(self: &Arc<Self>, choice: &str) -> bool {
        let mut tx = Transaction::for_choice(self.keypair.public_key.clone(), choice);
        let tx_hash = match tx.compute_hash() {
            Ok(hash) => hash,
            Err(e) => {
                error!("could not hash vote transaction: {e}");
                return false;
            }
        };
        tx.sign(self.keypair.sign(&tx_hash));

        let admitted = {
            let mut chain = self.chain.lock().await;
            chain.add_transaction(tx.clone(), Some(self.verifier.as_ref()))
        };
        if let Err(e) = admitted {
            warn!("vote rejected: {e}");
            return false;
        }

        info!("created vote transaction {}", tx.transaction_id);
        self.emit(NodeEvent::TransactionCreated(tx.clone()));
        self.broadcast_to_neighbors(MessageType::NewTransaction, &tx)
            .await;

        if self.auto_mine.load(Ordering::SeqCst) {
            self.start_mining().await;
        }
        true
    }

    /// Start mining if the mempool is nonempty and no search is running.
    /// Returns whether mining was started.
    pub async fn mine_now(self: &Arc<Self>) -> bool {
        self.start_mining().await
    }

    pub async fn chain_info(&self) -> ChainInfo {
        let chain = self.chain.lock().await;
        ChainInfo {
            chain_length: chain.len(),
            last_hash: chain.last_block().hash.clone(),
            pending_count: chain.pending_transactions().len(),
            mining: self.mining.load(Ordering::SeqCst),
        }
    }

    /// Tally over the committed chain only.
    pub async fn results(&self) -> std::collections::BTreeMap<String, u64> {
        self.chain.lock().await.vote_results()
    }

    pub fn set_auto_mine(&self, enabled: bool) {
        self.auto_mine.store(enabled, Ordering::SeqCst);
    }

    /// Merkle inclusion proof for a committed vote, or `None` while it is
    /// pending or unknown.
    pub async fn vote_proof(&self, tx_id: Uuid) -> Option<VoteProof> {
        let chain = self.chain.lock().await;
        let (block, _) = chain.find_committed(tx_id)?;
        let tree = MerkleTree::new(&block.transactions).ok()?;
        let proof = tree.proof(&block.transactions, tx_id).ok()?;
        Some(VoteProof {
            block_index: block.index,
            merkle_root: block.merkle_root.clone(),
            proof,
        })
    }

    /// Snapshot of the last tracker-pushed roster.
    pub async fn peers(&self) -> PeerList {
        self.roster.lock().await.clone()
    }

    // ── Tracker interactions ─────────────────────────────────────────────

    async fn register_with_tracker(&self, port: u16) {
        let data = RegisterData {
            host: self.config.host.clone(),
            port,
        };
        let envelope = match self.envelope(MessageType::Register, &data) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("could not build REGISTER message: {e}");
                return;
            }
        };

        match send(&self.config.tracker_addr(), &envelope).await {
            Ok(()) => info!("registered with tracker at {}", self.config.tracker_addr()),
            Err(e) => error!("failed to register with tracker: {e}"),
        }
    }

    /// Query the tracker for `{miner_id, difficulty}`. On transport
    /// failure the last-known credentials are kept.
    pub(crate) async fn refresh_credentials(&self) -> Option<MinerInfo> {
        let envelope = Envelope::new(MessageType::GetMiner, None, self.id.clone());
        match request(&self.config.tracker_addr(), &envelope).await {
            Ok(reply) if reply.kind == MessageType::GetMiner => match reply.payload::<MinerInfo>()
            {
                Ok(info) => {
                    debug!(
                        miner_id = info.miner_id,
                        difficulty = info.difficulty,
                        "refreshed miner credentials"
                    );
                    *self.credentials.lock().await = Some(info);
                    Some(info)
                }
                Err(e) => {
                    error!("malformed GET_MINER reply: {e}");
                    *self.credentials.lock().await
                }
            },
            Ok(reply) => {
                warn!("unexpected reply {:?} to GET_MINER", reply.kind);
                *self.credentials.lock().await
            }
            Err(e) => {
                warn!("miner query failed ({e}), using last-known credentials");
                *self.credentials.lock().await
            }
        }
    }

    pub(crate) async fn send_heartbeat(&self) -> Result<(), PeerError> {
        let chain = self.chain.lock().await.clone();
        let data = HeartbeatData {
            blockchain: serde_json::to_value(&chain)?,
        };
        let envelope = self.envelope(MessageType::Heartbeat, &data)?;
        send(&self.config.tracker_addr(), &envelope).await?;
        debug!("sent heartbeat to tracker");
        Ok(())
    }

    // ── Message handling ─────────────────────────────────────────────────

    pub(crate) async fn handle_connection(
        self: &Arc<Self>,
        mut stream: TcpStream,
    ) -> Result<(), PeerError> {
        let envelope = read_frame(&mut stream).await?;
        debug!(kind = ?envelope.kind, sender = %envelope.sender, "received message");

        match envelope.kind {
            MessageType::PeerList => self.handle_peer_list(&envelope).await,
            MessageType::NewTransaction => self.handle_new_transaction(&envelope).await,
            MessageType::NewBlock => self.handle_new_block(&envelope).await,
            MessageType::ChainRequest => self.handle_chain_request(&envelope, &mut stream).await?,
            MessageType::ChainResponse => self.adopt_chain(&envelope).await,
            MessageType::Unknown => warn!("dropping message of unknown type"),
            other => warn!("unexpected {other:?} message at a peer, dropping"),
        }
        Ok(())
    }

    async fn handle_peer_list(&self, envelope: &Envelope) {
        let roster: PeerList = match envelope.payload() {
            Ok(roster) => roster,
            Err(e) => {
                error!("malformed PEER_LIST: {e}");
                return;
            }
        };

        info!("updated peer list: {} peers", roster.len());
        *self.roster.lock().await = roster.clone();
        self.emit(NodeEvent::PeerListUpdated(roster));
    }

    async fn handle_new_transaction(self: &Arc<Self>, envelope: &Envelope) {
        let tx: Transaction = match envelope.payload() {
            Ok(tx) => tx,
            Err(e) => {
                error!("malformed NEW_TRANSACTION: {e}");
                return;
            }
        };

        let admitted = {
            let mut chain = self.chain.lock().await;
            chain.add_transaction(tx.clone(), Some(self.verifier.as_ref()))
        };
        match admitted {
            Ok(()) => {
                info!("admitted transaction {} from {}", tx.transaction_id, envelope.sender);
                self.emit(NodeEvent::TransactionAdded(tx));
                if self.auto_mine.load(Ordering::SeqCst) {
                    self.start_mining().await;
                }
            }
            Err(e) => warn!("rejected transaction from {}: {e}", envelope.sender),
        }
    }

    async fn handle_new_block(self: &Arc<Self>, envelope: &Envelope) {
        let block: vc_blockchain::Block = match envelope.payload() {
            Ok(block) => block,
            Err(e) => {
                error!("malformed NEW_BLOCK: {e}");
                return;
            }
        };
        let block_index = block.index;

        let appended = {
            let mut chain = self.chain.lock().await;
            chain.append_block(block.clone())
        };
        match appended {
            Ok(()) => {
                info!("added block {block_index} from {}", envelope.sender);
                self.emit(NodeEvent::BlockAdded(block));
            }
            Err(e) => {
                // Out-of-order delivery or a fork: fall back to a full
                // chain request instead of trusting the lone block.
                warn!("block {block_index} does not fit ({e}), requesting a full chain");
                self.request_chain().await;
            }
        }
    }

    async fn handle_chain_request(
        &self,
        envelope: &Envelope,
        stream: &mut TcpStream,
    ) -> Result<(), PeerError> {
        let chain = self.chain.lock().await.clone();
        let reply = self.envelope(MessageType::ChainResponse, &chain)?;
        write_frame(stream, &reply).await?;
        info!("sent blockchain to {}", envelope.sender);
        Ok(())
    }

    /// Ask a randomly chosen known peer for its full chain and adopt the
    /// response if it is strictly longer and valid.
    async fn request_chain(&self) {
        let target = {
            let roster = self.roster.lock().await;
            roster
                .iter()
                .filter(|(peer_id, _)| peer_id.as_str() != self.id)
                .map(|(_, addr)| addr.endpoint())
                .choose(&mut rand::thread_rng())
        };
        let Some(addr) = target else {
            debug!("no peers known, cannot request a chain");
            return;
        };

        let envelope = Envelope::new(MessageType::ChainRequest, None, self.id.clone());
        match request(&addr, &envelope).await {
            Ok(reply) if reply.kind == MessageType::ChainResponse => {
                info!("requested blockchain from {addr}");
                self.adopt_chain(&reply).await;
            }
            Ok(reply) => warn!("unexpected reply {:?} to CHAIN_REQUEST", reply.kind),
            Err(e) => error!("chain request to {addr} failed: {e}"),
        }
    }

    /// Longest-chain adoption of a `CHAIN_RESPONSE` payload.
    async fn adopt_chain(&self, envelope: &Envelope) {
        let candidate: Blockchain = match envelope.payload() {
            Ok(candidate) => candidate,
            Err(e) => {
                error!("malformed CHAIN_RESPONSE: {e}");
                return;
            }
        };

        let (replaced, new_length) = {
            let mut chain = self.chain.lock().await;
            (chain.try_replace(&candidate), chain.len())
        };
        if replaced {
            info!("adopted chain of length {new_length} from {}", envelope.sender);
            self.emit(NodeEvent::BlockchainUpdated { new_length });
        } else {
            debug!("candidate chain from {} ignored", envelope.sender);
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn envelope<T: Serialize>(&self, kind: MessageType, data: &T) -> Result<Envelope, PeerError> {
        Ok(Envelope::new(
            kind,
            Some(serde_json::to_value(data)?),
            self.id.clone(),
        ))
    }

    /// Send `data` to every topology neighbor currently present in the
    /// roster. Best-effort: transport failures are logged and dropped.
    pub(crate) async fn broadcast_to_neighbors<T: Serialize>(&self, kind: MessageType, data: &T) {
        let targets: Vec<String> = {
            let roster = self.roster.lock().await;
            self.neighbors
                .iter()
                .filter_map(|neighbor| roster.get(neighbor).map(|addr| addr.endpoint()))
                .collect()
        };
        if targets.is_empty() {
            debug!("no reachable neighbors for {kind:?} broadcast");
            return;
        }

        let envelope = match self.envelope(kind, data) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("could not build {kind:?} broadcast: {e}");
                return;
            }
        };
        for addr in targets {
            if let Err(e) = send(&addr, &envelope).await {
                error!("broadcast to {addr} failed: {e}");
            }
        }
    }

    pub(crate) fn emit(&self, event: NodeEvent) {
        let _ = self.events.send(event);
    }
}

async fn accept_loop(node: Arc<Node>, listener: TcpListener) {
    while node.is_running() {
        tokio::select! {
            _ = node.shutdown.notified() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let node = node.clone();
                    tokio::spawn(async move {
                        if let Err(e) = node.handle_connection(stream).await {
                            error!("connection handler failed: {e}");
                        }
                    });
                }
                Err(e) => {
                    if node.is_running() {
                        error!("accept failed: {e}");
                    } else {
                        break;
                    }
                }
            }
        }
    }
    debug!("peer listener stopped");
}

async fn heartbeat_loop(node: Arc<Node>) {
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while node.is_running() {
        tokio::select! {
            _ = node.shutdown.notified() => break,
            _ = ticker.tick() => {
                if let Err(e) = node.send_heartbeat().await {
                    // Best-effort: retried on the next tick.
                    error!("heartbeat failed: {e}");
                }
            }
        }
    }
    debug!("heartbeat loop stopped");
}
