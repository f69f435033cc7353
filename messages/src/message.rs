//! The closed set of election messages and the dispatch shared by all kinds.

use std::fmt;

use fedvote_types::{Identity, MessageHash, Signature, Timestamp};

use crate::codec::{CodecError, Reader, Writer};
use crate::fault::FaultMessage;
use crate::level::LevelMessage;
use crate::location::ElectionLocation;
use crate::sign::{MessageSigner, SignatureVerifier};
use crate::volunteer::VolunteerMessage;
use crate::vote::VoteMessage;

/// Wire type tag of each message kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Volunteer,
    Vote,
    Level,
    Fault,
}

impl MessageKind {
    pub const ALL: [MessageKind; 4] = [
        MessageKind::Volunteer,
        MessageKind::Vote,
        MessageKind::Level,
        MessageKind::Fault,
    ];

    pub fn tag(self) -> u8 {
        match self {
            MessageKind::Volunteer => 0x41,
            MessageKind::Vote => 0x42,
            MessageKind::Level => 0x43,
            MessageKind::Fault => 0x44,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, CodecError> {
        Self::ALL
            .into_iter()
            .find(|k| k.tag() == tag)
            .ok_or(CodecError::UnknownTag(tag))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Volunteer => "volunteer",
            MessageKind::Vote => "vote",
            MessageKind::Level => "level",
            MessageKind::Fault => "fault",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn write_header(w: &mut Writer, kind: MessageKind, ts: Timestamp, loc: &ElectionLocation) {
    w.put_u8(kind.tag());
    w.put_timestamp(ts);
    loc.write(w);
}

pub(crate) fn read_header(
    r: &mut Reader<'_>,
    kind: MessageKind,
) -> Result<(Timestamp, ElectionLocation), CodecError> {
    let found = r.u8()?;
    if found != kind.tag() {
        return Err(CodecError::UnexpectedTag {
            expected: kind.tag(),
            found,
        });
    }
    let ts = r.timestamp()?;
    let loc = ElectionLocation::read(r)?;
    Ok((ts, loc))
}

/// Behaviour shared by every signed message: the signable prefix, its hash,
/// and signing/verification over it.
///
/// The signable prefix covers every field except the signature and, for
/// level messages, the justification list. Stripping a justification
/// therefore changes neither the hash nor the validity of the signature.
pub trait SignedPayload {
    const KIND: MessageKind;

    fn write_signable(&self, w: &mut Writer);
    fn signer(&self) -> Identity;
    fn signature(&self) -> &Signature;
    fn set_signature(&mut self, signature: Signature);

    fn signable_bytes(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(192);
        self.write_signable(&mut w);
        w.into_bytes()
    }

    /// Content hash: Blake2b-256 of the signable prefix.
    fn hash(&self) -> MessageHash {
        fedvote_crypto::hash_message(&self.signable_bytes())
    }

    fn sign_with(&mut self, signer: &dyn MessageSigner) {
        let signature = signer.sign(&self.signable_bytes());
        self.set_signature(signature);
    }

    fn verify_with(&self, verifier: &dyn SignatureVerifier) -> bool {
        verifier.verify(&self.signer(), &self.signable_bytes(), self.signature())
    }
}

/// One election message of any kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElectionMessage {
    Volunteer(VolunteerMessage),
    Vote(VoteMessage),
    Level(LevelMessage),
    Fault(FaultMessage),
}

impl ElectionMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ElectionMessage::Volunteer(_) => MessageKind::Volunteer,
            ElectionMessage::Vote(_) => MessageKind::Vote,
            ElectionMessage::Level(_) => MessageKind::Level,
            ElectionMessage::Fault(_) => MessageKind::Fault,
        }
    }

    pub fn location(&self) -> ElectionLocation {
        match self {
            ElectionMessage::Volunteer(m) => m.location,
            ElectionMessage::Vote(m) => m.location,
            ElectionMessage::Level(m) => m.location,
            ElectionMessage::Fault(m) => m.location,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            ElectionMessage::Volunteer(m) => m.timestamp,
            ElectionMessage::Vote(m) => m.timestamp,
            ElectionMessage::Level(m) => m.timestamp,
            ElectionMessage::Fault(m) => m.timestamp,
        }
    }

    /// The identity whose signature the message carries.
    pub fn signer(&self) -> Identity {
        match self {
            ElectionMessage::Volunteer(m) => m.signer(),
            ElectionMessage::Vote(m) => m.signer(),
            ElectionMessage::Level(m) => m.signer(),
            ElectionMessage::Fault(m) => m.signer(),
        }
    }

    pub fn hash(&self) -> MessageHash {
        match self {
            ElectionMessage::Volunteer(m) => m.hash(),
            ElectionMessage::Vote(m) => m.hash(),
            ElectionMessage::Level(m) => m.hash(),
            ElectionMessage::Fault(m) => m.hash(),
        }
    }

    pub fn signature(&self) -> Signature {
        match self {
            ElectionMessage::Volunteer(m) => m.signature,
            ElectionMessage::Vote(m) => m.signature,
            ElectionMessage::Level(m) => m.signature,
            ElectionMessage::Fault(m) => m.signature,
        }
    }

    pub fn signable_bytes(&self) -> Vec<u8> {
        match self {
            ElectionMessage::Volunteer(m) => m.signable_bytes(),
            ElectionMessage::Vote(m) => m.signable_bytes(),
            ElectionMessage::Level(m) => m.signable_bytes(),
            ElectionMessage::Fault(m) => m.signable_bytes(),
        }
    }

    pub fn sign_with(&mut self, signer: &dyn MessageSigner) {
        match self {
            ElectionMessage::Volunteer(m) => m.sign_with(signer),
            ElectionMessage::Vote(m) => m.sign_with(signer),
            ElectionMessage::Level(m) => m.sign_with(signer),
            ElectionMessage::Fault(m) => m.sign_with(signer),
        }
    }

    /// Verify the message signature, and for level messages every
    /// justification entry as well.
    pub fn verify_with(&self, verifier: &dyn SignatureVerifier) -> bool {
        match self {
            ElectionMessage::Volunteer(m) => m.verify_with(verifier),
            ElectionMessage::Vote(m) => m.verify_with(verifier),
            ElectionMessage::Level(m) => m.verify_all(verifier),
            ElectionMessage::Fault(m) => m.verify_with(verifier),
        }
    }

    pub fn marshal(&self) -> Vec<u8> {
        match self {
            ElectionMessage::Volunteer(m) => m.marshal(),
            ElectionMessage::Vote(m) => m.marshal(),
            ElectionMessage::Level(m) => m.marshal(),
            ElectionMessage::Fault(m) => m.marshal(),
        }
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self, CodecError> {
        let r = Reader::new(bytes);
        match MessageKind::from_tag(r.peek_u8()?)? {
            MessageKind::Volunteer => VolunteerMessage::unmarshal(bytes).map(Self::Volunteer),
            MessageKind::Vote => VoteMessage::unmarshal(bytes).map(Self::Vote),
            MessageKind::Level => LevelMessage::unmarshal(bytes).map(Self::Level),
            MessageKind::Fault => FaultMessage::unmarshal(bytes).map(Self::Fault),
        }
    }

    pub fn as_level(&self) -> Option<&LevelMessage> {
        match self {
            ElectionMessage::Level(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_committed_level(&self) -> bool {
        self.as_level().is_some_and(|l| l.committed)
    }
}

impl From<VolunteerMessage> for ElectionMessage {
    fn from(m: VolunteerMessage) -> Self {
        Self::Volunteer(m)
    }
}

impl From<VoteMessage> for ElectionMessage {
    fn from(m: VoteMessage) -> Self {
        Self::Vote(m)
    }
}

impl From<LevelMessage> for ElectionMessage {
    fn from(m: LevelMessage) -> Self {
        Self::Level(m)
    }
}

impl From<FaultMessage> for ElectionMessage {
    fn from(m: FaultMessage) -> Self {
        Self::Fault(m)
    }
}
