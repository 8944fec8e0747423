use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("transaction {0} already pending or committed")]
    DuplicateTransaction(Uuid),

    #[error("voter {0} has already voted")]
    DoubleVote(String),

    #[error("invalid signature on transaction {0}")]
    BadSignature(Uuid),

    #[error("block {0} does not extend the current tip")]
    InvalidBlock(u64),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("transaction error: {0}")]
    Transaction(#[from] vc_transaction::TransactionError),

    #[error("merkle error: {0}")]
    Merkle(#[from] vc_merkle::MerkleError),
}
