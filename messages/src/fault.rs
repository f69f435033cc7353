//! Round-advance trigger.

use fedvote_types::{Identity, Signature, Timestamp};

use crate::codec::{CodecError, Reader, Writer};
use crate::location::ElectionLocation;
use crate::message::{read_header, write_header, MessageKind, SignedPayload};

/// Timeout/fault event for one election.
///
/// `location.round` is the round the election should move to. `nonce` comes
/// from the issuing adapter's counter so that repeated timeouts for the same
/// round still hash differently.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaultMessage {
    pub location: ElectionLocation,
    pub timestamp: Timestamp,
    pub faulted: Identity,
    pub signer: Identity,
    pub nonce: u64,
    pub signature: Signature,
}

impl SignedPayload for FaultMessage {
    const KIND: MessageKind = MessageKind::Fault;

    fn write_signable(&self, w: &mut Writer) {
        write_header(w, Self::KIND, self.timestamp, &self.location);
        w.put_identity(&self.faulted);
        w.put_identity(&self.signer);
        w.put_u64(self.nonce);
    }

    fn signer(&self) -> Identity {
        self.signer
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn set_signature(&mut self, signature: Signature) {
        self.signature = signature;
    }
}

impl FaultMessage {
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
            signer: r.identity()?,
            nonce: r.u64()?,
            signature: r.signature()?,
        };
        r.finish()?;
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fault(nonce: u64) -> FaultMessage {
        FaultMessage {
            location: ElectionLocation::new(3, 1, 0, 2),
            timestamp: Timestamp::new(1000),
            faulted: Identity::new([1; 32]),
            signer: Identity::new([2; 32]),
            nonce,
            signature: Signature::EMPTY,
        }
    }

    #[test]
    fn marshal_roundtrip() {
        let msg = fault(7);
        assert_eq!(FaultMessage::unmarshal(&msg.marshal()).unwrap(), msg);
    }

    #[test]
    fn nonce_changes_hash() {
        assert_ne!(fault(1).hash(), fault(2).hash());
    }

    #[test]
    fn trailing_garbage_rejected() {
        let mut bytes = fault(1).marshal();
        bytes.push(0);
        assert_eq!(FaultMessage::unmarshal(&bytes), Err(CodecError::TrailingBytes(1)));
    }
}
