//! Cryptographic primitives for the fedvote election protocol.
//!
//! - **Ed25519** for signing election messages and verifying them against the
//!   signer's identity
//! - **Blake2b-256** for message content hashes
//! - **SHA-256** for the per-election candidate ordering mask

pub mod hash;
pub mod keys;
pub mod sign;

pub use hash::{blake2b_256, blake2b_256_multi, hash_message, sha256_multi};
pub use keys::{generate_keypair, keypair_from_private, keypair_from_seed};
pub use sign::{sign_message, verify_signature};
