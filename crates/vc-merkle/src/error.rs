use thiserror::Error;

#[derive(Debug, Error)]
pub enum MerkleError {
    #[error("tree is empty")]
    Empty,

    #[error("transaction not found in tree")]
    NotFound,

    #[error("transaction error: {0}")]
    Transaction(#[from] vc_transaction::TransactionError),
}
