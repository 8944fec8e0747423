use uuid::Uuid;

use crate::{canonical::sha256_hex, now_secs};

/// Simulated signing key pair for the demo voting network.
///
/// This is NOT real cryptography: the private key is derived from the
/// public key so that [`crate::DemoKeyVerifier`] can check signatures
/// without key distribution. The real scheme plugs in behind
/// [`crate::SignatureVerifier`].
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// Hex digest identifying the voter; used as `voter_id`.
    pub public_key: String,
    private_key: String,
}

impl KeyPair {
    /// Generate a fresh demo key pair.
    pub fn generate() -> Self {
        let seed = format!("{}{}", Uuid::new_v4(), now_secs());
        let public_key = sha256_hex(seed.as_bytes());
        let private_key = demo_private_key(&public_key);
        Self {
            public_key,
            private_key,
        }
    }

    /// Sign a message (a transaction hash) with the demo scheme.
    pub fn sign(&self, message: &str) -> String {
        sha256_hex(format!("{message}{}", self.private_key).as_bytes())
    }
}

/// Derive the demo private key for a public key. Insecure on purpose;
/// exists so signing and verification agree without key exchange.
pub(crate) fn demo_private_key(public_key: &str) -> String {
    sha256_hex(format!("DEMO_ONLY_{public_key}").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_distinct() {
        assert_ne!(KeyPair::generate().public_key, KeyPair::generate().public_key);
    }

    #[test]
    fn signing_is_deterministic_per_key() {
        let kp = KeyPair::generate();
        assert_eq!(kp.sign("msg"), kp.sign("msg"));
        assert_ne!(kp.sign("msg"), kp.sign("other"));
    }
}
