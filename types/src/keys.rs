//! Signing key material and signatures.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Identity, TypesError};

/// A 32-byte Ed25519 secret seed. Not `Debug`, `Clone` or serializable;
/// wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey(pub [u8; 32]);

/// A 64-byte Ed25519 signature over a message's signable prefix.
///
/// Signatures travel inside the election wire codec, never through serde.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    /// Carried by a message that has not been signed yet.
    pub const EMPTY: Self = Self([0u8; 64]);

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        let s = s.trim();
        if s.len() != 128 {
            return Err(TypesError::InvalidLength {
                expected: 128,
                actual: s.len(),
            });
        }
        let mut out = [0u8; 64];
        hex::decode_to_slice(s, &mut out).map_err(|e| TypesError::InvalidHex(e.to_string()))?;
        Ok(Self(out))
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("Signature(unsigned)")
        } else {
            write!(f, "Signature({}..)", hex::encode(&self.0[..6]))
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A participant's signing key. `identity` is the public half.
pub struct KeyPair {
    pub identity: Identity,
    pub private: PrivateKey,
}
