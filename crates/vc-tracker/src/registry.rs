use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use vc_net::{PeerAddr, PeerList};

/// One active peer in the directory.
#[derive(Debug, Clone)]
pub struct PeerEntry {
    pub host: String,
    pub port: u16,
    pub last_heartbeat: Instant,
    pub miner_id: u64,
}

impl PeerEntry {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The tracker's peer directory and stake ledger.
///
/// Miner ids are assigned exactly once per distinct peer id, monotonically
/// from 1, and are never re-assigned: the `assigned` map is kept for the
/// tracker's lifetime even after a peer expires, so a rejoining peer gets
/// its old id (and stake) back.
#[derive(Debug, Default)]
pub struct Registry {
    /// Peers currently considered alive, keyed by peer id.
    active: BTreeMap<String, PeerEntry>,

    /// Every miner id ever assigned, keyed by peer id. Never pruned.
    assigned: BTreeMap<String, u64>,

    /// Stake per miner id. Unbounded; clamped only at difficulty time.
    stakes: BTreeMap<u64, i64>,

    next_miner_id: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or refresh a peer. A known peer id keeps its miner id
    /// (re-registration just updates the endpoint and heartbeat time).
    /// Returns `(miner_id, is_new)`.
    pub fn register(&mut self, peer_id: &str, host: String, port: u16) -> (u64, bool) {
        let (miner_id, is_new) = match self.assigned.get(peer_id) {
            Some(&miner_id) => (miner_id, false),
            None => {
                self.next_miner_id += 1;
                self.assigned.insert(peer_id.to_string(), self.next_miner_id);
                self.stakes.insert(self.next_miner_id, 0);
                (self.next_miner_id, true)
            }
        };

        self.active.insert(
            peer_id.to_string(),
            PeerEntry {
                host,
                port,
                last_heartbeat: Instant::now(),
                miner_id,
            },
        );
        (miner_id, is_new)
    }

    /// Refresh a peer's heartbeat time. Returns `false` for peers not in
    /// the active table.
    pub fn touch(&mut self, peer_id: &str) -> bool {
        match self.active.get_mut(peer_id) {
            Some(entry) => {
                entry.last_heartbeat = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Drop every active peer silent for longer than `expiry` and return
    /// the evicted entries. Miner ids and stakes are preserved.
    pub fn evict_expired(&mut self, expiry: Duration) -> Vec<(String, PeerEntry)> {
        let dead: Vec<String> = self
            .active
            .iter()
            .filter(|(_, entry)| entry.last_heartbeat.elapsed() > expiry)
            .map(|(peer_id, _)| peer_id.clone())
            .collect();

        dead.into_iter()
            .filter_map(|peer_id| {
                self.active
                    .remove(&peer_id)
                    .map(|entry| (peer_id, entry))
            })
            .collect()
    }

    /// The broadcastable roster of active peers.
    pub fn roster(&self) -> PeerList {
        self.active
            .iter()
            .map(|(peer_id, entry)| {
                (
                    peer_id.clone(),
                    PeerAddr {
                        host: entry.host.clone(),
                        port: entry.port,
                    },
                )
            })
            .collect()
    }

    /// Dialable endpoints of all active peers.
    pub fn endpoints(&self) -> Vec<String> {
        self.active.values().map(PeerEntry::endpoint).collect()
    }

    /// The miner id of an active peer.
    pub fn miner_of(&self, peer_id: &str) -> Option<u64> {
        self.active.get(peer_id).map(|entry| entry.miner_id)
    }

    /// Current stake of a miner; unknown miners read as 0.
    pub fn stake(&self, miner_id: u64) -> i64 {
        self.stakes.get(&miner_id).copied().unwrap_or(0)
    }

    /// Apply a heartbeat audit's stake adjustment for one miner.
    pub fn apply_stake_delta(&mut self, miner_id: u64, delta: i64) {
        *self.stakes.entry(miner_id).or_insert(0) += delta;
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, peer_id: &str) -> bool {
        self.active.contains_key(peer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miner_ids_are_monotonic_from_one() {
        let mut registry = Registry::new();
        let (a, a_new) = registry.register("h:1", "h".into(), 1);
        let (b, b_new) = registry.register("h:2", "h".into(), 2);

        assert_eq!((a, a_new), (1, true));
        assert_eq!((b, b_new), (2, true));
    }

    #[test]
    fn re_registration_keeps_the_miner_id() {
        let mut registry = Registry::new();
        let (first, _) = registry.register("h:1", "h".into(), 1);
        // Same peer id, new endpoint.
        let (second, is_new) = registry.register("h:1", "elsewhere".into(), 9);

        assert_eq!(first, second);
        assert!(!is_new);
        assert_eq!(registry.roster()["h:1"].host, "elsewhere");
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn eviction_preserves_miner_id_and_stake() {
        let mut registry = Registry::new();
        let (miner_id, _) = registry.register("h:1", "h".into(), 1);
        registry.apply_stake_delta(miner_id, 5);

        let evicted = registry.evict_expired(Duration::ZERO);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].0, "h:1");
        assert!(!registry.is_active("h:1"));
        assert_eq!(registry.stake(miner_id), 5);

        // Rejoining gets the old id back.
        let (rejoined, is_new) = registry.register("h:1", "h".into(), 1);
        assert_eq!(rejoined, miner_id);
        assert!(!is_new);
    }

    #[test]
    fn fresh_peers_are_not_evicted() {
        let mut registry = Registry::new();
        registry.register("h:1", "h".into(), 1);
        assert!(registry.evict_expired(Duration::from_secs(3600)).is_empty());
        assert!(registry.is_active("h:1"));
    }

    #[test]
    fn touch_only_refreshes_active_peers() {
        let mut registry = Registry::new();
        registry.register("h:1", "h".into(), 1);

        assert!(registry.touch("h:1"));
        assert!(!registry.touch("h:9"));
    }

    #[test]
    fn stake_deltas_accumulate() {
        let mut registry = Registry::new();
        let (miner_id, _) = registry.register("h:1", "h".into(), 1);

        registry.apply_stake_delta(miner_id, 2);
        registry.apply_stake_delta(miner_id, -1);
        assert_eq!(registry.stake(miner_id), 1);

        // Miners from foreign chains may appear before registering here.
        registry.apply_stake_delta(42, -1);
        assert_eq!(registry.stake(42), -1);
    }
}
