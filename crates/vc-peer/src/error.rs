use thiserror::Error;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("network error: {0}")]
    Net(#[from] vc_net::NetError),

    #[error("blockchain error: {0}")]
    Blockchain(#[from] vc_blockchain::BlockchainError),

    #[error("merkle error: {0}")]
    Merkle(#[from] vc_merkle::MerkleError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
