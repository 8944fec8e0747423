use std::collections::BTreeMap;

/// Per-miner outcome of a chain audit: how many of the miner's blocks
/// validated and how many failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MinerTally {
    pub valid: u32,
    pub invalid: u32,
}

impl MinerTally {
    /// The boolean view: all of this miner's blocks in the chain validated.
    pub fn all_valid(&self) -> bool {
        self.invalid == 0
    }

    /// Stake adjustment the tracker applies: +1 per valid block, −1 per
    /// failing block.
    pub fn stake_delta(&self) -> i64 {
        i64::from(self.valid) - i64::from(self.invalid)
    }
}

/// Result of validating a chain end-to-end.
///
/// Genesis contributes no miner; every other block is attributed to its
/// `miner_id` and counted in `miner_tallies`.
#[derive(Debug, Clone, Default)]
pub struct ChainAudit {
    /// Genesis matched the deterministic genesis and every subsequent
    /// block extended its predecessor validly.
    pub chain_ok: bool,

    /// Valid/invalid block counts keyed by miner id.
    pub miner_tallies: BTreeMap<u64, MinerTally>,

    /// Sum of the stake snapshots recorded in the chain's blocks.
    pub chain_score: i64,
}

impl ChainAudit {
    pub(crate) fn record(&mut self, miner_id: Option<u64>, block_ok: bool) {
        if !block_ok {
            self.chain_ok = false;
        }
        if let Some(miner_id) = miner_id {
            let tally = self.miner_tallies.entry(miner_id).or_default();
            if block_ok {
                tally.valid += 1;
            } else {
                tally.invalid += 1;
            }
        }
    }
}
