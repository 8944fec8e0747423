use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use vc_blockchain::{mining_difficulty, Blockchain};
use vc_net::{
    read_frame, send, write_frame, Envelope, HeartbeatData, MessageType, MinerInfo, PeerList,
    RegisterData,
};

use crate::{error::TrackerError, registry::Registry};

/// How often the liveness reaper runs.
pub(crate) const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Peers silent for longer than this are evicted.
pub(crate) const PEER_EXPIRY: Duration = Duration::from_secs(30);

/// Configuration for a [`Tracker`].
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Host address to listen on.
    pub host: String,

    /// TCP port to listen on; 0 lets the OS pick.
    pub port: u16,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

/// The singleton coordinator of the voting network.
///
/// Registers peers, assigns stable miner ids, distributes the roster,
/// adopts the longest valid chain reported via heartbeats as the
/// reference, and feeds per-block validity back into per-miner stake.
/// Not a consensus authority beyond longest-chain selection.
pub struct Tracker {
    /// `host:port` of the listener; used as the message sender id.
    id: String,

    registry: Mutex<Registry>,

    /// Longest valid chain reported so far; shipped to newcomers.
    chain: Mutex<Blockchain>,

    running: AtomicBool,
    shutdown: Notify,
}

impl Tracker {
    /// Bind the listener and spawn the accept loop and liveness reaper.
    pub async fn start(config: TrackerConfig) -> Result<Arc<Self>, TrackerError> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let port = listener.local_addr()?.port();
        let id = format!("{}:{port}", config.host);

        let tracker = Arc::new(Self {
            id: id.clone(),
            registry: Mutex::new(Registry::new()),
            chain: Mutex::new(Blockchain::new()),
            running: AtomicBool::new(true),
            shutdown: Notify::new(),
        });

        info!("tracker {id} listening");

        tokio::spawn(accept_loop(tracker.clone(), listener));
        tokio::spawn(reaper_loop(tracker.clone()));

        Ok(tracker)
    }

    /// The tracker's dialable `host:port`.
    pub fn addr(&self) -> &str {
        &self.id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();
        info!("tracker stopped");
    }

    async fn handle_connection(self: &Arc<Self>, mut stream: TcpStream) -> Result<(), TrackerError> {
        let envelope = read_frame(&mut stream).await?;
        debug!(kind = ?envelope.kind, sender = %envelope.sender, "received message");

        match envelope.kind {
            MessageType::Register => self.handle_register(&envelope).await,
            MessageType::Heartbeat => self.handle_heartbeat(&envelope).await,
            MessageType::GetMiner => self.handle_get_miner(&envelope, &mut stream).await?,
            MessageType::Unknown => warn!("dropping message of unknown type"),
            other => warn!("unexpected {other:?} message at the tracker, dropping"),
        }
        Ok(())
    }

    /// `REGISTER`: admit (or refresh) the peer, broadcast the roster to
    /// everyone, and ship the reference chain to the registrant.
    async fn handle_register(&self, envelope: &Envelope) {
        let data: RegisterData = match envelope.payload() {
            Ok(data) => data,
            Err(e) => {
                error!("malformed REGISTER: {e}");
                return;
            }
        };
        let peer_id = envelope.sender.clone();
        let peer_addr = format!("{}:{}", data.host, data.port);

        let (miner_id, is_new, roster, endpoints) = {
            let mut registry = self.registry.lock().await;
            let (miner_id, is_new) = registry.register(&peer_id, data.host, data.port);
            (miner_id, is_new, registry.roster(), registry.endpoints())
        };

        if is_new {
            info!("registered peer {peer_id} as miner {miner_id}");
        } else {
            // Re-registration keeps the assigned miner id.
            info!("peer {peer_id} re-registered, keeping miner {miner_id}");
        }

        self.broadcast_roster(&roster, &endpoints).await;
        self.send_reference_chain(&peer_addr).await;
    }

    /// `HEARTBEAT`: refresh liveness, audit the attached chain, adopt it
    /// as reference if strictly longer and valid, and apply the per-block
    /// stake deltas.
    async fn handle_heartbeat(&self, envelope: &Envelope) {
        let peer_id = envelope.sender.as_str();

        if !self.registry.lock().await.touch(peer_id) {
            warn!("heartbeat from unknown peer {peer_id}");
            return;
        }

        let data: HeartbeatData = match envelope.payload() {
            Ok(data) => data,
            Err(e) => {
                error!("malformed HEARTBEAT from {peer_id}: {e}");
                return;
            }
        };
        let candidate: Blockchain = match serde_json::from_value(data.blockchain) {
            Ok(candidate) => candidate,
            Err(e) => {
                error!("unparseable chain in heartbeat from {peer_id}: {e}");
                return;
            }
        };

        // Audit outside any lock; it is pure CPU.
        let audit = candidate.audit();

        {
            let mut chain = self.chain.lock().await;
            if audit.chain_ok && candidate.len() > chain.len() {
                *chain = candidate;
                info!("updated reference chain from peer {peer_id}");
            }
        }

        let mut registry = self.registry.lock().await;
        for (miner_id, tally) in &audit.miner_tallies {
            registry.apply_stake_delta(*miner_id, tally.stake_delta());
            debug!(
                miner_id,
                valid = tally.valid,
                invalid = tally.invalid,
                stake = registry.stake(*miner_id),
                "adjusted stake"
            );
        }
    }

    /// `GET_MINER`: reply with the requester's miner id and its current
    /// stake-derived difficulty on the same connection. Unregistered
    /// senders get no reply.
    async fn handle_get_miner(
        &self,
        envelope: &Envelope,
        stream: &mut TcpStream,
    ) -> Result<(), TrackerError> {
        let info = {
            let registry = self.registry.lock().await;
            registry.miner_of(&envelope.sender).map(|miner_id| MinerInfo {
                miner_id,
                difficulty: mining_difficulty(registry.stake(miner_id)),
            })
        };
        let Some(info) = info else {
            warn!("GET_MINER from unregistered peer {}", envelope.sender);
            return Ok(());
        };

        let reply = Envelope::new(
            MessageType::GetMiner,
            Some(serde_json::to_value(info)?),
            self.id.clone(),
        );
        write_frame(stream, &reply).await?;
        info!(
            "sent miner id {} (difficulty {}) to {}",
            info.miner_id, info.difficulty, envelope.sender
        );
        Ok(())
    }

    /// Push the current roster to every active peer.
    async fn broadcast_roster(&self, roster: &PeerList, endpoints: &[String]) {
        let envelope = match serde_json::to_value(roster) {
            Ok(data) => Envelope::new(MessageType::PeerList, Some(data), self.id.clone()),
            Err(e) => {
                error!("could not serialize roster: {e}");
                return;
            }
        };

        for addr in endpoints {
            if let Err(e) = send(addr, &envelope).await {
                error!("roster broadcast to {addr} failed: {e}");
            }
        }
        info!("broadcast peer list to {} peers", endpoints.len());
    }

    /// Ship the reference chain to a newly registered peer so it can
    /// catch up immediately.
    async fn send_reference_chain(&self, peer_addr: &str) {
        let chain = self.chain.lock().await.clone();
        let envelope = match serde_json::to_value(&chain) {
            Ok(data) => Envelope::new(MessageType::ChainResponse, Some(data), self.id.clone()),
            Err(e) => {
                error!("could not serialize reference chain: {e}");
                return;
            }
        };

        match send(peer_addr, &envelope).await {
            Ok(()) => info!("sent reference chain to {peer_addr}"),
            Err(e) => error!("failed to send reference chain to {peer_addr}: {e}"),
        }
    }

    /// One reaper pass: evict silent peers; re-broadcast the roster when
    /// anything was evicted.
    async fn sweep_expired(&self) {
        let (evicted, roster, endpoints) = {
            let mut registry = self.registry.lock().await;
            let evicted = registry.evict_expired(PEER_EXPIRY);
            (evicted, registry.roster(), registry.endpoints())
        };
        if evicted.is_empty() {
            return;
        }

        for (peer_id, entry) in &evicted {
            info!("removing dead peer {peer_id} at {}", entry.endpoint());
        }
        self.broadcast_roster(&roster, &endpoints).await;
    }
}

async fn accept_loop(tracker: Arc<Tracker>, listener: TcpListener) {
    while tracker.is_running() {
        tokio::select! {
            _ = tracker.shutdown.notified() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let tracker = tracker.clone();
                    tokio::spawn(async move {
                        if let Err(e) = tracker.handle_connection(stream).await {
                            error!("connection handler failed: {e}");
                        }
                    });
                }
                Err(e) => {
                    if tracker.is_running() {
                        error!("accept failed: {e}");
                    } else {
                        break;
                    }
                }
            }
        }
    }
    debug!("tracker listener stopped");
}

async fn reaper_loop(tracker: Arc<Tracker>) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while tracker.is_running() {
        tokio::select! {
            _ = tracker.shutdown.notified() => break,
            _ = ticker.tick() => tracker.sweep_expired().await,
        }
    }
    debug!("reaper loop stopped");
}
