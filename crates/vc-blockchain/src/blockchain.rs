use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vc_merkle::MerkleTree;
use vc_transaction::{SignatureVerifier, Transaction};

use crate::{audit::ChainAudit, block::Block, error::BlockchainError};

/// `is_valid_next(B, P)`: `B` extends `P` iff its stored hash matches its
/// canonical form, its merkle root matches its transactions, it links to
/// `P` by hash and index, and its hash meets the stake-derived target.
pub fn is_valid_next(block: &Block, previous: &Block) -> bool {
    let recomputed = match block.compute_hash() {
        Ok(hash) => hash,
        Err(_) => return false,
    };
    let expected_root = match MerkleTree::new(&block.transactions).and_then(|t| t.root()) {
        Ok(root) => root,
        Err(_) => return false,
    };

    block.hash == recomputed
        && block.merkle_root == expected_root
        && block.previous_hash == previous.hash
        && block.index == previous.index + 1
        && block.meets_target()
}

/// The ledger one node maintains: the committed chain plus the mempool of
/// pending transactions.
///
/// Invariants:
/// - Always contains at least the deterministic genesis block.
/// - Every block's `previous_hash` matches the hash of its predecessor
///   and indices are contiguous from 0.
/// - A voter contributes at most one transaction across chain + mempool.
/// - `chain_score` is the sum of the stake snapshots in the chain.
///
/// Serializes as the wire `<Blockchain>` shape
/// `{chain, pending_transactions, chain_score}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blockchain {
    chain: Vec<Block>,
    pending_transactions: Vec<Transaction>,
    chain_score: i64,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    /// Initialise a new chain holding only the genesis block.
    pub fn new() -> Self {
        Self {
            chain: vec![Block::genesis()],
            pending_transactions: Vec::new(),
            chain_score: 0,
        }
    }

    /// Number of blocks in the chain (including genesis).
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// The most recent block.
    pub fn last_block(&self) -> &Block {
        // Safety: always at least one block (genesis).
        self.chain.last().expect("chain always contains genesis")
    }

    /// All committed blocks.
    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    /// The mempool of admitted but uncommitted transactions.
    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending_transactions
    }

    pub fn chain_score(&self) -> i64 {
        self.chain_score
    }

    /// Whether a transaction id is already pending or committed.
    pub fn contains_transaction(&self, tx_id: &Uuid) -> bool {
        self.pending_transactions
            .iter()
            .any(|tx| tx.transaction_id == *tx_id)
            || self
                .chain
                .iter()
                .flat_map(|b| &b.transactions)
                .any(|tx| tx.transaction_id == *tx_id)
    }

    /// Whether a voter already has a transaction pending or committed.
    pub fn has_voter_voted(&self, voter_id: &str) -> bool {
        self.pending_transactions
            .iter()
            .any(|tx| tx.voter_id == voter_id)
            || self
                .chain
                .iter()
                .flat_map(|b| &b.transactions)
                .any(|tx| tx.voter_id == voter_id)
    }

    /// Admit a transaction into the mempool.
    ///
    /// Rejects duplicates by id, double votes by voter, and (when a
    /// verifier is supplied) transactions whose signature fails over the
    /// canonical-minus-signature hash. A missing signature fails
    /// verification.
    pub fn add_transaction(
        &mut self,
        transaction: Transaction,
        verifier: Option<&dyn SignatureVerifier>,
    ) -> Result<(), BlockchainError> {
        if self.contains_transaction(&transaction.transaction_id) {
            return Err(BlockchainError::DuplicateTransaction(
                transaction.transaction_id,
            ));
        }
        if self.has_voter_voted(&transaction.voter_id) {
            return Err(BlockchainError::DoubleVote(transaction.voter_id.clone()));
        }

        if let Some(verifier) = verifier {
            let tx_hash = transaction.compute_hash()?;
            let accepted = transaction
                .signature
                .as_deref()
                .is_some_and(|sig| verifier.verify(&tx_hash, sig, &transaction.voter_id));
            if !accepted {
                return Err(BlockchainError::BadSignature(transaction.transaction_id));
            }
        }

        self.pending_transactions.push(transaction);
        Ok(())
    }

    /// Append a block that must validly extend the current tip, then purge
    /// the mempool of every transaction committed by it.
    pub fn append_block(&mut self, block: Block) -> Result<(), BlockchainError> {
        if !is_valid_next(&block, self.last_block()) {
            return Err(BlockchainError::InvalidBlock(block.index));
        }

        self.chain_score += block.stake_value.unwrap_or(0);
        self.clear_confirmed(&block);
        self.chain.push(block);
        Ok(())
    }

    /// Seal the whole mempool into a new block and mine it.
    ///
    /// Returns `Ok(None)` when there is nothing to mine or the search was
    /// cancelled via `keep_running`.
    pub fn mine_pending_transactions<F: Fn() -> bool>(
        &mut self,
        miner_id: u64,
        stake_value: i64,
        keep_running: F,
    ) -> Result<Option<Block>, BlockchainError> {
        if self.pending_transactions.is_empty() {
            return Ok(None);
        }

        let mut block = Block::new(
            self.chain.len() as u64,
            self.pending_transactions.clone(),
            self.last_block().hash.clone(),
            Some(miner_id),
            Some(stake_value),
        )?;

        if !block.mine(keep_running)? {
            return Ok(None);
        }

        self.append_block(block.clone())?;
        Ok(Some(block))
    }

    /// Validate this chain end-to-end: genesis must equal the
    /// deterministic genesis, every later block must satisfy
    /// [`is_valid_next`]. Accumulates per-miner valid/invalid tallies
    /// (genesis contributes no miner) and the chain score.
    pub fn audit(&self) -> ChainAudit {
        let mut audit = ChainAudit {
            chain_ok: true,
            ..ChainAudit::default()
        };

        let genesis = Block::genesis();
        match self.chain.first() {
            Some(first) if first.hash == genesis.hash => {
                audit.chain_score += first.stake_value.unwrap_or(0);
            }
            Some(first) => {
                audit.chain_score += first.stake_value.unwrap_or(0);
                audit.chain_ok = false;
            }
            None => audit.chain_ok = false,
        }

        for window in self.chain.windows(2) {
            let (previous, block) = (&window[0], &window[1]);
            audit.chain_score += block.stake_value.unwrap_or(0);
            audit.record(block.miner_id, is_valid_next(block, previous));
        }

        audit
    }

    /// Longest-chain rule: adopt `candidate`'s chain iff it is strictly
    /// longer than ours and validates end-to-end. Our own pending
    /// transactions survive, minus any the adopted chain has committed.
    ///
    /// Returns whether the local chain was replaced.
    pub fn try_replace(&mut self, candidate: &Blockchain) -> bool {
        if candidate.chain.len() <= self.chain.len() {
            return false;
        }

        let audit = candidate.audit();
        if !audit.chain_ok {
            return false;
        }

        let committed: HashSet<Uuid> = candidate
            .chain
            .iter()
            .flat_map(|b| &b.transactions)
            .map(|tx| tx.transaction_id)
            .collect();

        self.chain = candidate.chain.clone();
        self.chain_score = audit.chain_score;
        self.pending_transactions
            .retain(|tx| !committed.contains(&tx.transaction_id));
        true
    }

    /// Drop every pending transaction whose id appears in `block`.
    pub fn clear_confirmed(&mut self, block: &Block) {
        let confirmed: HashSet<Uuid> = block
            .transactions
            .iter()
            .map(|tx| tx.transaction_id)
            .collect();
        self.pending_transactions
            .retain(|tx| !confirmed.contains(&tx.transaction_id));
    }

    /// Tally of `"choice"` values over the committed chain only.
    pub fn vote_results(&self) -> BTreeMap<String, u64> {
        let mut results = BTreeMap::new();
        for block in &self.chain {
            for tx in &block.transactions {
                if let Some(choice) = tx.choice() {
                    *results.entry(choice.to_string()).or_insert(0) += 1;
                }
            }
        }
        results
    }

    /// Locate a committed transaction and the block sealing it.
    pub fn find_committed(&self, tx_id: Uuid) -> Option<(&Block, &Transaction)> {
        self.chain.iter().find_map(|block| {
            block
                .transactions
                .iter()
                .find(|tx| tx.transaction_id == tx_id)
                .map(|tx| (block, tx))
        })
    }
}
