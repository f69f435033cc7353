//! Rank-0 endorsement of a volunteer.

use fedvote_types::{Identity, MessageHash, Signature, Timestamp};

use crate::codec::{CodecError, Reader, Writer};
use crate::location::ElectionLocation;
use crate::message::{read_header, write_header, MessageKind, SignedPayload};

/// A leader's acknowledgement that it has seen a specific volunteer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteMessage {
    pub location: ElectionLocation,
    pub timestamp: Timestamp,
    pub signer: Identity,
    /// Content hash of the endorsed volunteer message.
    pub volunteer: MessageHash,
    pub candidate: Identity,
    pub signature: Signature,
}

impl SignedPayload for VoteMessage {
    const KIND: MessageKind = MessageKind::Vote;

    fn write_signable(&self, w: &mut Writer) {
        write_header(w, Self::KIND, self.timestamp, &self.location);
        w.put_identity(&self.signer);
        w.put_hash(&self.volunteer);
        w.put_identity(&self.candidate);
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

impl VoteMessage {
    pub fn marshal(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(182);
        self.write_signable(&mut w);
        w.put_signature(&self.signature);
        w.into_bytes()
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(bytes);
        let msg = Self::read(&mut r)?;
        r.finish()?;
        Ok(msg)
    }

    pub(crate) fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let (timestamp, location) = read_header(r, Self::KIND)?;
        Ok(Self {
            location,
            timestamp,
            signer: r.identity()?,
            volunteer: r.hash()?,
            candidate: r.identity()?,
            signature: r.signature()?,
        })
    }
}
