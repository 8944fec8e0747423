pub mod error;
pub mod proof;
pub mod tree;

pub use error::MerkleError;
pub use proof::{MerkleProof, ProofNode, ProofSide};
pub use tree::MerkleTree;
