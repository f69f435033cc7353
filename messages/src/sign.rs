//! Signing and verification seam.
//!
//! The election core never touches key material directly; it signs through a
//! [`MessageSigner`] and checks peers through a [`SignatureVerifier`].

use fedvote_types::{Identity, KeyPair, PrivateKey, Signature};

pub trait MessageSigner {
    /// Identity the produced signatures verify against.
    fn identity(&self) -> Identity;
    fn sign(&self, data: &[u8]) -> Signature;
}

pub trait SignatureVerifier {
    fn verify(&self, signer: &Identity, data: &[u8], signature: &Signature) -> bool;
}

/// Ed25519 signer backed by a local key pair.
pub struct KeyPairSigner {
    keypair: KeyPair,
}

impl KeyPairSigner {
    pub fn new(keypair: KeyPair) -> Self {
        Self { keypair }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::new(fedvote_crypto::keypair_from_seed(seed))
    }

    pub fn from_private(private: PrivateKey) -> Self {
        Self::new(fedvote_crypto::keypair_from_private(private))
    }
}

impl MessageSigner for KeyPairSigner {
    fn identity(&self) -> Identity {
        self.keypair.identity
    }

    fn sign(&self, data: &[u8]) -> Signature {
        fedvote_crypto::sign_message(data, &self.keypair.private)
    }
}

/// Ed25519 verification against the signer's identity bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, signer: &Identity, data: &[u8], signature: &Signature) -> bool {
        fedvote_crypto::verify_signature(data, signature, signer)
    }
}
