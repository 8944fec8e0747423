pub mod error;
pub mod registry;
pub mod tracker;

pub use error::TrackerError;
pub use registry::{PeerEntry, Registry};
pub use tracker::{Tracker, TrackerConfig};
