pub mod canonical;
pub mod error;
pub mod keypair;
pub mod transaction;
pub mod verifier;

pub use canonical::{canonical_json, sha256_hex};
pub use error::TransactionError;
pub use keypair::KeyPair;
pub use transaction::Transaction;
pub use verifier::{AcceptAll, DemoKeyVerifier, SignatureVerifier};

/// Wall-clock seconds since the Unix epoch, with sub-second precision.
pub fn now_secs() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6
}
