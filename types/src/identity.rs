//! Participant identity.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// A 32-byte participant identity.
///
/// Identities are opaque to the protocol apart from byte-wise comparison.
/// Every identity doubles as the participant's Ed25519 public key, so a
/// signature can be checked against the identity named in the message.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity([u8; 32]);

impl Identity {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// XOR every byte with `mask`. Applying the same mask twice is the identity.
    pub fn masked(&self, mask: &[u8; 32]) -> Self {
        let mut out = self.0;
        for (b, m) in out.iter_mut().zip(mask.iter()) {
            *b ^= m;
        }
        Self(out)
    }

    /// First four bytes in hex, for compact log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        crate::decode32(s).map(Self)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.short())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}
