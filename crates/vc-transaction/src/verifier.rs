use crate::{canonical::sha256_hex, keypair::demo_private_key};

/// Capability the chain core uses to admit or reject transactions.
///
/// `tx_hash` is the canonical-minus-signature hash of the transaction
/// (see [`crate::Transaction::compute_hash`]), `voter_id` the signer's
/// public key.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, tx_hash: &str, signature: &str, voter_id: &str) -> bool;
}

/// Accepts every signature. Demo deployments only.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl SignatureVerifier for AcceptAll {
    fn verify(&self, _tx_hash: &str, _signature: &str, _voter_id: &str) -> bool {
        true
    }
}

/// Recomputes the expected demo-scheme signature from the voter's public
/// key and compares. Accepts exactly the signatures produced by
/// [`crate::KeyPair::sign`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoKeyVerifier;

impl SignatureVerifier for DemoKeyVerifier {
    fn verify(&self, tx_hash: &str, signature: &str, voter_id: &str) -> bool {
        let expected = sha256_hex(format!("{tx_hash}{}", demo_private_key(voter_id)).as_bytes());
        signature == expected
    }
}

#[cfg(test)]
mod tests {
    use crate::{KeyPair, Transaction};

    use super::*;

    #[test]
    fn demo_verifier_accepts_honest_signatures() {
        let kp = KeyPair::generate();
        let mut tx = Transaction::for_choice(kp.public_key.clone(), "X");
        let hash = tx.compute_hash().unwrap();
        tx.sign(kp.sign(&hash));

        assert!(DemoKeyVerifier.verify(&hash, tx.signature.as_deref().unwrap(), &kp.public_key));
    }

    #[test]
    fn demo_verifier_rejects_tampered_signatures() {
        let kp = KeyPair::generate();
        let tx = Transaction::for_choice(kp.public_key.clone(), "X");
        let hash = tx.compute_hash().unwrap();

        assert!(!DemoKeyVerifier.verify(&hash, "not-a-signature", &kp.public_key));
    }

    #[test]
    fn demo_verifier_rejects_wrong_signer() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let tx = Transaction::for_choice(kp.public_key.clone(), "X");
        let hash = tx.compute_hash().unwrap();
        let sig = other.sign(&hash);

        assert!(!DemoKeyVerifier.verify(&hash, &sig, &kp.public_key));
    }

    #[test]
    fn accept_all_accepts_anything() {
        assert!(AcceptAll.verify("h", "s", "v"));
    }
}
