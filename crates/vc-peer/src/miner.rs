use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use vc_blockchain::{Block, BlockchainError, DEFAULT_DIFFICULTY};
use vc_net::MessageType;

use crate::{event::NodeEvent, node::Node};

impl Node {
    /// Start a mining round if the mempool is nonempty and no round is
    /// already running. Returns whether a round was started.
    ///
    /// The round snapshots the mempool and tip under the chain lock,
    /// searches the nonce on a blocking thread outside it, then
    /// re-acquires the lock to commit, discarding the block if the tip
    /// advanced in the meantime.
    pub(crate) async fn start_mining(self: &Arc<Self>) -> bool {
        if self.chain.lock().await.pending_transactions().is_empty() {
            debug!("nothing to mine");
            return false;
        }
        if self
            .mining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("mining already in progress");
            return false;
        }

        info!("started mining");
        let node = self.clone();
        tokio::spawn(async move {
            node.run_mining_round().await;
            node.mining.store(false, Ordering::SeqCst);
        });
        true
    }

    async fn run_mining_round(self: &Arc<Self>) {
        // Fresh credentials if the tracker answers, last-known otherwise.
        let Some(credentials) = self.refresh_credentials().await else {
            warn!("no miner credentials known, skipping mining round");
            return;
        };
        // The reply carries the difficulty; recover the stake snapshot
        // from it. Equal to the tracker's stake whenever the clamp is
        // inactive, and difficulty-equivalent always.
        let stake_value = DEFAULT_DIFFICULTY - credentials.difficulty as i64;

        let (pending, last_block) = {
            let chain = self.chain.lock().await;
            (
                chain.pending_transactions().to_vec(),
                chain.last_block().clone(),
            )
        };
        if pending.is_empty() {
            return;
        }

        let worker = self.clone();
        let mined = tokio::task::spawn_blocking(move || -> Result<Option<Block>, BlockchainError> {
            let mut block = Block::new(
                last_block.index + 1,
                pending,
                last_block.hash.clone(),
                Some(credentials.miner_id),
                Some(stake_value),
            )?;
            if block.mine(|| worker.running.load(Ordering::Relaxed))? {
                Ok(Some(block))
            } else {
                Ok(None)
            }
        })
        .await;

        let block = match mined {
            Ok(Ok(Some(block))) => block,
            Ok(Ok(None)) => {
                debug!("mining cancelled by shutdown");
                return;
            }
            Ok(Err(e)) => {
                error!("mining failed: {e}");
                return;
            }
            Err(e) => {
                error!("mining task panicked: {e}");
                return;
            }
        };

        let committed = {
            let mut chain = self.chain.lock().await;
            if chain.last_block().hash != block.previous_hash {
                warn!("tip advanced during mining, discarding block {}", block.index);
                false
            } else {
                match chain.append_block(block.clone()) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("mined block no longer fits: {e}");
                        false
                    }
                }
            }
        };
        if !committed {
            return;
        }

        info!("mined block {} with {} transaction(s)", block.index, block.transactions.len());
        self.emit(NodeEvent::BlockMined(block.clone()));
        self.broadcast_to_neighbors(MessageType::NewBlock, &block).await;
    }
}
