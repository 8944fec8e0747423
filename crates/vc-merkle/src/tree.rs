use sha2::{Digest, Sha256};
use uuid::Uuid;
use vc_transaction::Transaction;

use crate::{
    error::MerkleError,
    proof::{MerkleProof, ProofNode, ProofSide},
};

/// A binary Merkle tree built from a slice of [`Transaction`]s.
///
/// Hashes live in the hex-string domain: leaves are the canonical
/// transaction hashes, and a parent is the SHA-256 of the two children's
/// hex strings concatenated and UTF-8 encoded. When a level has an odd
/// number of hashes the last one is duplicated.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// All levels of the tree, `levels[0]` = leaf hashes,
    /// `levels[last]` = single root hash.
    levels: Vec<Vec<String>>,
}

/// Root of the empty transaction list: `sha256("")`.
pub fn empty_root() -> String {
    hex::encode(Sha256::digest(b""))
}

pub(crate) fn hash_pair(left: &str, right: &str) -> String {
    let mut data = left.as_bytes().to_vec();
    data.extend_from_slice(right.as_bytes());
    hex::encode(Sha256::digest(&data))
}

impl MerkleTree {
    /// Build a Merkle tree from `transactions`. An empty slice yields the
    /// single-node tree whose root is [`empty_root`].
    pub fn new(transactions: &[Transaction]) -> Result<Self, MerkleError> {
        if transactions.is_empty() {
            return Ok(Self {
                levels: vec![vec![empty_root()]],
            });
        }

        let mut hashes: Vec<String> = transactions
            .iter()
            .map(|tx| tx.compute_hash().map_err(MerkleError::from))
            .collect::<Result<_, _>>()?;

        let mut levels: Vec<Vec<String>> = vec![hashes.clone()];

        while hashes.len() > 1 {
            // Duplicate last hash when the level is odd-width.
            if hashes.len() % 2 != 0 {
                let last = hashes.last().cloned().ok_or(MerkleError::Empty)?;
                hashes.push(last);
            }

            let parent_level: Vec<String> = hashes
                .chunks(2)
                .map(|chunk| hash_pair(&chunk[0], &chunk[1]))
                .collect();

            levels.push(parent_level.clone());
            hashes = parent_level;
        }

        Ok(Self { levels })
    }

    /// The Merkle root hash. Guarded even though construction always
    /// leaves a single-hash top level.
    pub fn root(&self) -> Result<String, MerkleError> {
        self.levels
            .last()
            .and_then(|l| l.first())
            .cloned()
            .ok_or(MerkleError::Empty)
    }

    /// Build an inclusion proof for the transaction with the given `tx_id`.
    ///
    /// The caller must supply `transactions` (same slice used to build the
    /// tree) so the id can be resolved to a leaf index.
    pub fn proof(
        &self,
        transactions: &[Transaction],
        tx_id: Uuid,
    ) -> Result<MerkleProof, MerkleError> {
        let leaf_index = transactions
            .iter()
            .position(|tx| tx.transaction_id == tx_id)
            .ok_or(MerkleError::NotFound)?;

        let leaf_hash = self.levels[0][leaf_index].clone();
        let mut path = Vec::new();
        let mut index = leaf_index;

        for level in &self.levels[..self.levels.len() - 1] {
            // Pad to even width, mirroring the build logic.
            let mut padded = level.clone();
            if padded.len() % 2 != 0 {
                let last = padded.last().cloned().ok_or(MerkleError::Empty)?;
                padded.push(last);
            }

            let sibling_index = if index % 2 == 0 { index + 1 } else { index - 1 };
            let side = if index % 2 == 0 {
                ProofSide::Right
            } else {
                ProofSide::Left
            };

            path.push(ProofNode {
                hash: padded[sibling_index].clone(),
                side,
            });

            index /= 2;
        }

        Ok(MerkleProof { leaf_hash, path })
    }
}

#[cfg(test)]
mod tests {
    use vc_transaction::Transaction;

    use super::*;

    fn make_tx(choice: &str) -> Transaction {
        Transaction::for_choice(format!("voter-{choice}"), choice)
    }

    #[test]
    fn empty_transactions_root_is_hash_of_empty_string() {
        let tree = MerkleTree::new(&[]).unwrap();
        assert_eq!(
            tree.root().unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn single_transaction_root_equals_leaf_hash() {
        let tx = make_tx("a");
        let tree = MerkleTree::new(std::slice::from_ref(&tx)).unwrap();
        assert_eq!(tree.root().unwrap(), tx.compute_hash().unwrap());
    }

    #[test]
    fn odd_leaf_count_duplicates_the_last_hash() {
        let txs = [make_tx("a"), make_tx("b"), make_tx("c")];
        let [a, b, c] = [
            txs[0].compute_hash().unwrap(),
            txs[1].compute_hash().unwrap(),
            txs[2].compute_hash().unwrap(),
        ];

        let expected = hash_pair(&hash_pair(&a, &b), &hash_pair(&c, &c));
        let tree = MerkleTree::new(&txs).unwrap();
        assert_eq!(tree.root().unwrap(), expected);
    }

    #[test]
    fn proof_verifies_for_every_transaction() {
        let txs: Vec<Transaction> = ["a", "b", "c", "d"].iter().map(|c| make_tx(c)).collect();

        let tree = MerkleTree::new(&txs).unwrap();
        let root = tree.root().unwrap();

        for tx in &txs {
            let proof = tree.proof(&txs, tx.transaction_id).unwrap();
            assert!(proof.verify(&root), "proof failed for tx {}", tx.transaction_id);
        }
    }

    #[test]
    fn proof_verifies_odd_number_of_transactions() {
        let txs: Vec<Transaction> = ["a", "b", "c", "d", "e"].iter().map(|c| make_tx(c)).collect();

        let tree = MerkleTree::new(&txs).unwrap();
        let root = tree.root().unwrap();

        for tx in &txs {
            let proof = tree.proof(&txs, tx.transaction_id).unwrap();
            assert!(proof.verify(&root), "proof failed for tx {}", tx.transaction_id);
        }
    }

    #[test]
    fn tampered_root_fails_verification() {
        let txs: Vec<Transaction> = ["a", "b", "c", "d"].iter().map(|c| make_tx(c)).collect();

        let tree = MerkleTree::new(&txs).unwrap();
        let mut wrong_root = tree.root().unwrap();
        wrong_root.replace_range(0..1, if wrong_root.starts_with('0') { "1" } else { "0" });

        let proof = tree.proof(&txs, txs[0].transaction_id).unwrap();
        assert!(!proof.verify(&wrong_root));
    }

    #[test]
    fn unknown_transaction_yields_not_found() {
        let txs = [make_tx("a")];
        let tree = MerkleTree::new(&txs).unwrap();
        assert!(matches!(
            tree.proof(&txs, uuid::Uuid::new_v4()),
            Err(MerkleError::NotFound)
        ));
    }
}
