use vc_blockchain::Block;
use vc_net::PeerList;
use vc_transaction::Transaction;

/// High-level events emitted by a running [`crate::Node`] that callers
/// (e.g. a voting frontend) can subscribe to via a channel. The core
/// never reaches into UI types.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// This node created and admitted a vote of its own.
    TransactionCreated(Transaction),

    /// A gossiped transaction was admitted to the mempool.
    TransactionAdded(Transaction),

    /// This node mined and committed a block.
    BlockMined(Block),

    /// A gossiped block extended the local chain.
    BlockAdded(Block),

    /// The local chain was replaced by a longer valid chain.
    BlockchainUpdated { new_length: usize },

    /// The tracker pushed a fresh peer roster.
    PeerListUpdated(PeerList),
}
