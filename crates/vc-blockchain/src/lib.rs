pub mod audit;
pub mod block;
pub mod blockchain;
pub mod error;

pub use audit::{ChainAudit, MinerTally};
pub use block::{
    mining_difficulty, Block, DEFAULT_DIFFICULTY, MAX_DIFFICULTY, MIN_DIFFICULTY,
};
pub use blockchain::{is_valid_next, Blockchain};
pub use error::BlockchainError;
