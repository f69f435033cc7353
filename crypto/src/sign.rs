//! Ed25519 signatures over election messages.
//!
//! Verification is strict: small-order keys and non-canonical signatures are
//! refused, so one leader cannot produce two distinct valid encodings of the
//! same claim and dodge equivocation detection.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use fedvote_types::{Identity, PrivateKey, Signature};

pub fn sign_message(message: &[u8], private_key: &PrivateKey) -> Signature {
    Signature(SigningKey::from_bytes(&private_key.0).sign(message).to_bytes())
}

/// `true` when `signature` was produced over `message` by the key behind
/// `signer`. Unsigned messages never verify.
pub fn verify_signature(message: &[u8], signature: &Signature, signer: &Identity) -> bool {
    if signature.is_empty() {
        return false;
    }
    VerifyingKey::from_bytes(signer.as_bytes())
        .map(|key| {
            key.verify_strict(message, &ed25519_dalek::Signature::from_bytes(&signature.0))
                .is_ok()
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::keypair_from_seed;

    const VOLUNTEER: &[u8] = b"volunteer h=10 m=3 slot=1 round=0";

    #[test]
    fn leader_signature_verifies_only_for_that_leader() {
        let leader = keypair_from_seed(&[1u8; 32]);
        let other = keypair_from_seed(&[2u8; 32]);
        let sig = sign_message(VOLUNTEER, &leader.private);
        assert!(verify_signature(VOLUNTEER, &sig, &leader.identity));
        assert!(!verify_signature(VOLUNTEER, &sig, &other.identity));
    }

    #[test]
    fn altered_payload_is_refused() {
        let leader = keypair_from_seed(&[3u8; 32]);
        let sig = sign_message(VOLUNTEER, &leader.private);
        assert!(!verify_signature(b"volunteer h=10 m=3 slot=1 round=1", &sig, &leader.identity));
    }

    #[test]
    fn signing_is_deterministic() {
        let leader = keypair_from_seed(&[99u8; 32]);
        assert_eq!(sign_message(VOLUNTEER, &leader.private), sign_message(VOLUNTEER, &leader.private));
    }

    #[test]
    fn unsigned_or_garbage_identity_never_verifies() {
        let leader = keypair_from_seed(&[7u8; 32]);
        assert!(!verify_signature(VOLUNTEER, &Signature::EMPTY, &leader.identity));
        let sig = sign_message(VOLUNTEER, &leader.private);
        assert!(!verify_signature(VOLUNTEER, &sig, &Identity::new([0xFF; 32])));
    }
}
