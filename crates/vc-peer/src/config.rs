use std::path::PathBuf;

/// Full configuration for a [`crate::Node`].
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Host address the node listens on and advertises to the tracker.
    pub host: String,

    /// TCP port to listen on. 0 lets the OS pick; the assigned port
    /// becomes part of the node id.
    pub port: u16,

    /// Tracker endpoint.
    pub tracker_host: String,
    pub tracker_port: u16,

    /// Overlay topology file naming this node's gossip neighbors.
    pub topology_file: PathBuf,

    /// Start mining automatically whenever a transaction is admitted.
    pub auto_mine: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            tracker_host: "127.0.0.1".to_string(),
            tracker_port: 5000,
            topology_file: PathBuf::from("topology.dat"),
            auto_mine: false,
        }
    }
}

impl PeerConfig {
    /// The tracker's dialable `host:port`.
    pub fn tracker_addr(&self) -> String {
        format!("{}:{}", self.tracker_host, self.tracker_port)
    }
}
