//! Fundamental types for the fedvote election protocol.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! participant identities, content hashes, signatures and key pairs, and timestamps.

pub mod error;
pub mod hash;
pub mod identity;
pub mod keys;
pub mod time;

pub use error::TypesError;
pub use hash::MessageHash;
pub use identity::Identity;
pub use keys::{KeyPair, PrivateKey, Signature};
pub use time::Timestamp;

/// Parse a 64-character hex string into 32 bytes.
pub(crate) fn decode32(s: &str) -> Result<[u8; 32], TypesError> {
    let s = s.trim();
    if s.len() != 64 {
        return Err(TypesError::InvalidLength {
            expected: 64,
            actual: s.len(),
        });
    }
    let mut out = [0u8; 32];
    hex::decode_to_slice(s, &mut out).map_err(|e| TypesError::InvalidHex(e.to_string()))?;
    Ok(out)
}
