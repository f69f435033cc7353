//! Ed25519 key material. A participant's identity is its verifying key.

use ed25519_dalek::SigningKey;
use fedvote_types::{Identity, KeyPair, PrivateKey};
use rand::rngs::OsRng;

fn to_keypair(signing_key: &SigningKey) -> KeyPair {
    KeyPair {
        identity: Identity::new(signing_key.verifying_key().to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

/// Fresh key pair from the operating system RNG. Used when a node is started
/// without a configured identity seed.
pub fn generate_keypair() -> KeyPair {
    to_keypair(&SigningKey::generate(&mut OsRng))
}

/// Rebuild the key pair owning `private`; the secret is consumed.
pub fn keypair_from_private(private: PrivateKey) -> KeyPair {
    to_keypair(&SigningKey::from_bytes(&private.0))
}

/// Deterministic key pair. Simulations and tests seed every federation
/// member this way so identities are reproducible.
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    to_keypair(&SigningKey::from_bytes(seed))
}
