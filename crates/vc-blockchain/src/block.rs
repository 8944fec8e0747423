use serde::{Deserialize, Serialize};
use vc_merkle::MerkleTree;
use vc_transaction::{canonical_json, now_secs, sha256_hex, Transaction};

use crate::BlockchainError;

/// Difficulty of a miner with zero stake.
pub const DEFAULT_DIFFICULTY: i64 = 4;
/// Floor of the clamp; high-stake miners never mine below this.
pub const MIN_DIFFICULTY: i64 = 1;
/// Ceiling of the clamp; misbehaving miners never mine above this.
pub const MAX_DIFFICULTY: i64 = 8;

/// Leading-`'0'` hex characters a block hash must carry, derived from the
/// miner's stake: `clamp(4 − stake, 1, 8)`.
pub fn mining_difficulty(stake_value: i64) -> usize {
    (DEFAULT_DIFFICULTY - stake_value).clamp(MIN_DIFFICULTY, MAX_DIFFICULTY) as usize
}

/// A block in the voting chain.
///
/// `hash` is SHA-256 over the canonical JSON form of every other field;
/// `merkle_root` commits to the ordered transaction list. `miner_id` and
/// `stake_value` are `None` only on genesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// 0-based height; genesis is 0.
    pub index: u64,

    /// Ordered transactions sealed into this block.
    pub transactions: Vec<Transaction>,

    /// Hex hash of the parent block; `"0"` for genesis.
    pub previous_hash: String,

    /// Wall-clock seconds at block creation (0.0 for genesis).
    pub timestamp: f64,

    /// Proof-of-work counter.
    pub nonce: u64,

    /// Merkle root of `transactions`.
    pub merkle_root: String,

    /// Tracker-assigned id of the miner; `None` on genesis.
    pub miner_id: Option<u64>,

    /// The miner's stake at mining time; `None` on genesis.
    pub stake_value: Option<i64>,

    /// Hex hash of this block's canonical form.
    pub hash: String,
}

impl Block {
    /// Build a new unmined block on top of `previous_hash`, stamped with
    /// the current time.
    pub fn new(
        index: u64,
        transactions: Vec<Transaction>,
        previous_hash: String,
        miner_id: Option<u64>,
        stake_value: Option<i64>,
    ) -> Result<Self, BlockchainError> {
        Self::with_timestamp(index, transactions, previous_hash, now_secs(), miner_id, stake_value)
    }

    /// Build a block with an explicit timestamp.
    pub fn with_timestamp(
        index: u64,
        transactions: Vec<Transaction>,
        previous_hash: String,
        timestamp: f64,
        miner_id: Option<u64>,
        stake_value: Option<i64>,
    ) -> Result<Self, BlockchainError> {
        let merkle_root = MerkleTree::new(&transactions)?.root()?;

        let mut block = Self {
            index,
            transactions,
            previous_hash,
            timestamp,
            nonce: 0,
            merkle_root,
            miner_id,
            stake_value,
            hash: String::new(),
        };
        block.hash = block.compute_hash()?;
        Ok(block)
    }

    /// The deterministic first block: index 0, no transactions,
    /// `previous_hash = "0"`, timestamp 0.0, no miner, no stake.
    /// Identical on every node.
    pub fn genesis() -> Self {
        Self::with_timestamp(0, Vec::new(), "0".to_string(), 0.0, None, None)
            .expect("genesis block construction cannot fail")
    }

    /// SHA-256 over the canonical JSON form with the `hash` field removed.
    pub fn compute_hash(&self) -> Result<String, BlockchainError> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.remove("hash");
        }
        Ok(sha256_hex(canonical_json(&value)?.as_bytes()))
    }

    /// Difficulty this block must meet. A block without a stake snapshot
    /// derives it from stake 0; genesis is never proof-of-work checked.
    pub fn difficulty(&self) -> usize {
        mining_difficulty(self.stake_value.unwrap_or(0))
    }

    /// Whether `hash` carries the required leading zeros.
    pub fn meets_target(&self) -> bool {
        let difficulty = self.difficulty();
        self.hash.len() >= difficulty
            && self.hash.as_bytes()[..difficulty].iter().all(|&b| b == b'0')
    }

    /// Proof-of-work: increment `nonce` and rehash until the target is
    /// met. `keep_running` is polled between attempts; returns `false` if
    /// the search was cancelled before a valid nonce was found.
    pub fn mine<F: Fn() -> bool>(&mut self, keep_running: F) -> Result<bool, BlockchainError> {
        while !self.meets_target() {
            if !keep_running() {
                return Ok(false);
            }
            self.nonce += 1;
            self.hash = self.compute_hash()?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_is_deterministic_across_nodes() {
        let a = Block::genesis();
        let b = Block::genesis();

        assert_eq!(a.hash, b.hash);
        assert_eq!(a.index, 0);
        assert_eq!(a.previous_hash, "0");
        assert!(a.transactions.is_empty());
        assert_eq!(a.miner_id, None);
        assert_eq!(a.stake_value, None);
        assert_eq!(a.merkle_root, sha256_hex(b""));
    }

    #[test]
    fn hash_field_is_excluded_from_the_hash() {
        let block = Block::genesis();
        // The stored hash was computed with `hash` absent; recomputing on
        // the populated struct must agree.
        assert_eq!(block.hash, block.compute_hash().unwrap());
    }

    #[test]
    fn difficulty_clamps_at_both_ends() {
        assert_eq!(mining_difficulty(-100), MAX_DIFFICULTY as usize);
        assert_eq!(mining_difficulty(100), MIN_DIFFICULTY as usize);
        assert_eq!(mining_difficulty(0), DEFAULT_DIFFICULTY as usize);
        assert_eq!(mining_difficulty(3), 1);
        assert_eq!(mining_difficulty(-4), 8);
    }

    #[test]
    fn mining_meets_the_stake_derived_target() {
        let tx = Transaction::for_choice("voter-a", "X");
        let genesis = Block::genesis();
        // Stake 2 → difficulty 2: quick to mine, still a real search.
        let mut block =
            Block::new(1, vec![tx], genesis.hash.clone(), Some(1), Some(2)).unwrap();

        assert!(block.mine(|| true).unwrap());
        assert!(block.meets_target());
        assert!(block.hash.starts_with("00"));
        assert_eq!(block.hash, block.compute_hash().unwrap());
    }

    #[test]
    fn cancelled_mining_stops_without_a_valid_nonce() {
        let tx = Transaction::for_choice("voter-a", "X");
        let genesis = Block::genesis();
        // Stake −100 → difficulty 8: the initial hash will not meet it.
        let mut block =
            Block::new(1, vec![tx], genesis.hash.clone(), Some(1), Some(-100)).unwrap();

        assert!(!block.mine(|| false).unwrap());
        assert!(!block.meets_target());
    }
}
