//! Candidate self-nomination.

use fedvote_types::{Identity, Signature, Timestamp};

use crate::codec::{CodecError, Reader, Writer};
use crate::location::ElectionLocation;
use crate::message::{read_header, write_header, MessageKind, SignedPayload};

/// A candidate's offer to replace the faulted leader of `location.slot`.
///
/// `missing` and `ack` carry the protocol message the faulted leader failed
/// to produce and its acknowledgement. The election relays them opaquely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolunteerMessage {
    pub location: ElectionLocation,
    pub timestamp: Timestamp,
    pub faulted: Identity,
    /// Index of the faulted leader in the live leader list.
    pub faulted_index: u32,
    pub candidate: Identity,
    /// Index of the candidate in the live candidate list.
    pub candidate_index: u32,
    pub missing: Vec<u8>,
    pub ack: Vec<u8>,
    pub signature: Signature,
}

impl SignedPayload for VolunteerMessage {
    const KIND: MessageKind = MessageKind::Volunteer;

    fn write_signable(&self, w: &mut Writer) {
        write_header(w, Self::KIND, self.timestamp, &self.location);
        w.put_identity(&self.faulted);
        w.put_u32(self.faulted_index);
        w.put_identity(&self.candidate);
        w.put_u32(self.candidate_index);
        w.put_bytes(&self.missing);
        w.put_bytes(&self.ack);
    }

    fn signer(&self) -> Identity {
        self.candidate
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn set_signature(&mut self, signature: Signature) {
        self.signature = signature;
    }
}

impl VolunteerMessage {
    pub fn marshal(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.write_signable(&mut w);
        w.put_signature(&self.signature);
        w.into_bytes()
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(bytes);
        let (timestamp, location) = read_header(&mut r, Self::KIND)?;
        let msg = Self {
            location,
            timestamp,
            faulted: r.identity()?,
            faulted_index: r.u32()?,
            candidate: r.identity()?,
            candidate_index: r.u32()?,
            missing: r.bytes()?,
            ack: r.bytes()?,
            signature: r.signature()?,
        };
        r.finish()?;
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::{Ed25519Verifier, KeyPairSigner, MessageSigner};

    fn sample(signer: &KeyPairSigner) -> VolunteerMessage {
        let mut msg = VolunteerMessage {
            location: ElectionLocation::new(100, 4, 1, 0),
            timestamp: Timestamp::new(1_700_000_000_000),
            faulted: Identity::new([9; 32]),
            faulted_index: 1,
            candidate: signer.identity(),
            candidate_index: 2,
            missing: b"eom-4".to_vec(),
            ack: b"ack-eom-4".to_vec(),
            signature: Signature::EMPTY,
        };
        msg.sign_with(signer);
        msg
    }

    #[test]
    fn marshal_roundtrip() {
        let msg = sample(&KeyPairSigner::from_seed(&[11; 32]));
        let decoded = VolunteerMessage::unmarshal(&msg.marshal()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.hash(), msg.hash());
    }

    #[test]
    fn signed_by_candidate() {
        let msg = sample(&KeyPairSigner::from_seed(&[11; 32]));
        assert!(msg.verify_with(&Ed25519Verifier));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let mut msg = sample(&KeyPairSigner::from_seed(&[11; 32]));
        msg.missing[0] ^= 0x01;
        assert!(!msg.verify_with(&Ed25519Verifier));
    }

    #[test]
    fn truncated_input_rejected() {
        let bytes = sample(&KeyPairSigner::from_seed(&[11; 32])).marshal();
        assert!(VolunteerMessage::unmarshal(&bytes[..bytes.len() - 1]).is_err());
    }
}
