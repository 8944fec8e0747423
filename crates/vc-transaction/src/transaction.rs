use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    canonical::{canonical_json, sha256_hex},
    now_secs, TransactionError,
};

/// The key inside `vote_data` that the tally recognizes.
pub const CHOICE_KEY: &str = "choice";

/// A single vote cast by one voter.
///
/// `voter_id` is the voter's public key; at most one committed transaction
/// per voter is ever admitted (the double-vote rule, enforced by the chain
/// core). The `signature` covers the canonical form of the transaction
/// *without* the signature field itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier, assigned at creation.
    pub transaction_id: Uuid,

    /// Public key of the voter casting this vote.
    pub voter_id: String,

    /// Vote payload. The only key the tally recognizes is `"choice"`,
    /// whose value is the option name.
    pub vote_data: BTreeMap<String, serde_json::Value>,

    /// Demo-scheme signature over [`Transaction::compute_hash`].
    /// `None` until signed by the originating node.
    pub signature: Option<String>,

    /// Wall-clock seconds when this transaction was created.
    pub timestamp: f64,
}

impl Transaction {
    /// Create a new unsigned transaction stamped with the current time.
    pub fn new(voter_id: impl Into<String>, vote_data: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            transaction_id: Uuid::new_v4(),
            voter_id: voter_id.into(),
            vote_data,
            signature: None,
            timestamp: now_secs(),
        }
    }

    /// Convenience constructor for a plain single-choice ballot.
    pub fn for_choice(voter_id: impl Into<String>, choice: &str) -> Self {
        let mut vote_data = BTreeMap::new();
        vote_data.insert(CHOICE_KEY.to_string(), serde_json::Value::from(choice));
        Self::new(voter_id, vote_data)
    }

    /// SHA-256 hash of the canonical form with the `signature` field
    /// removed. This is what gets signed and what the Merkle tree hashes.
    pub fn compute_hash(&self) -> Result<String, TransactionError> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.remove("signature");
        }
        Ok(sha256_hex(canonical_json(&value)?.as_bytes()))
    }

    /// Attach a signature produced by [`crate::KeyPair::sign`].
    pub fn sign(&mut self, signature: String) {
        self.signature = Some(signature);
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// The ballot option named by this vote, if any.
    pub fn choice(&self) -> Option<&str> {
        self.vote_data.get(CHOICE_KEY).and_then(|v| v.as_str())
    }
}
