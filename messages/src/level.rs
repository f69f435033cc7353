//! Leveled claims and their justifications.

use std::cmp::Ordering;

use fedvote_types::{Identity, MessageHash, Signature, Timestamp};

use crate::codec::{CodecError, Reader, Writer, MAX_JUSTIFICATION_ENTRIES};
use crate::location::ElectionLocation;
use crate::message::{read_header, write_header, MessageKind, SignedPayload};
use crate::sign::SignatureVerifier;
use crate::vote::VoteMessage;

/// A leader's positional claim that `candidate` should replace the faulted
/// leader.
///
/// `rank` is the proof strength of the claim, `level` the issuer's own
/// message sequence number. Claims compare by rank, then by priority:
/// see [`LevelMessage::claim_cmp`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelMessage {
    pub location: ElectionLocation,
    pub timestamp: Timestamp,
    pub signer: Identity,
    pub candidate: Identity,
    /// Content hash of the volunteer the claim is for.
    pub volunteer: MessageHash,
    pub rank: u32,
    pub level: u32,
    pub volunteer_priority: u32,
    pub committed: bool,
    /// Leader whose progression anchors a committed claim.
    pub eom_from: Option<Identity>,
    pub signature: Signature,
    /// Messages proving the claim. Entries never carry a justification of
    /// their own.
    pub justification: Vec<Justification>,
}

/// One entry of a claim's justification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Justification {
    Vote(VoteMessage),
    Level(LevelMessage),
}

impl SignedPayload for LevelMessage {
    const KIND: MessageKind = MessageKind::Level;

    fn write_signable(&self, w: &mut Writer) {
        write_header(w, Self::KIND, self.timestamp, &self.location);
        w.put_identity(&self.signer);
        w.put_identity(&self.candidate);
        w.put_hash(&self.volunteer);
        w.put_u32(self.rank);
        w.put_u32(self.level);
        w.put_u32(self.volunteer_priority);
        w.put_bool(self.committed);
        match &self.eom_from {
            Some(id) => {
                w.put_bool(true);
                w.put_identity(id);
            }
            None => w.put_bool(false),
        }
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

impl LevelMessage {
    /// Order two claims by strength: larger rank wins, and at equal rank the
    /// smaller volunteer priority wins. `Greater` means `self` is stronger.
    pub fn claim_cmp(&self, other: &LevelMessage) -> Ordering {
        claim_order(
            (self.rank, self.volunteer_priority),
            (other.rank, other.volunteer_priority),
        )
    }

    /// Strict weak order: `self` is a weaker claim than `other`.
    pub fn less(&self, other: &LevelMessage) -> bool {
        self.claim_cmp(other) == Ordering::Less
    }

    /// Copy without justification, as embedded in another claim.
    pub fn stripped(&self) -> LevelMessage {
        LevelMessage {
            justification: Vec::new(),
            ..self.clone()
        }
    }

    /// Verify the claim's own signature and that of every justification entry.
    pub fn verify_all(&self, verifier: &dyn SignatureVerifier) -> bool {
        self.verify_with(verifier) && self.justification.iter().all(|j| j.verify_with(verifier))
    }

    pub fn marshal(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(256);
        self.write_signable(&mut w);
        w.put_signature(&self.signature);
        w.put_u32(self.justification.len() as u32);
        for entry in &self.justification {
            w.put_bytes(&entry.marshal());
        }
        w.into_bytes()
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(bytes);
        let msg = Self::read(&mut r)?;
        r.finish()?;
        Ok(msg)
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let mut msg = Self::read_body(r)?;
        let count = r.u32()? as usize;
        if count > MAX_JUSTIFICATION_ENTRIES {
            return Err(CodecError::FieldTooLong {
                len: count,
                max: MAX_JUSTIFICATION_ENTRIES,
            });
        }
        msg.justification.reserve(count);
        for _ in 0..count {
            msg.justification.push(Justification::unmarshal(&r.bytes()?)?);
        }
        Ok(msg)
    }

    /// Everything up to and including the signature. The justification is
    /// left empty.
    fn read_body(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let (timestamp, location) = read_header(r, Self::KIND)?;
        let signer = r.identity()?;
        let candidate = r.identity()?;
        let volunteer = r.hash()?;
        let rank = r.u32()?;
        let level = r.u32()?;
        let volunteer_priority = r.u32()?;
        let committed = r.bool()?;
        let eom_from = if r.bool()? { Some(r.identity()?) } else { None };
        let signature = r.signature()?;
        Ok(Self {
            location,
            timestamp,
            signer,
            candidate,
            volunteer,
            rank,
            level,
            volunteer_priority,
            committed,
            eom_from,
            signature,
            justification: Vec::new(),
        })
    }
}

/// Compare `(rank, priority)` pairs by claim strength.
pub fn claim_order(a: (u32, u32), b: (u32, u32)) -> Ordering {
    a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1))
}

impl Justification {
    pub fn signer(&self) -> Identity {
        match self {
            Justification::Vote(v) => v.signer,
            Justification::Level(l) => l.signer,
        }
    }

    pub fn candidate(&self) -> Identity {
        match self {
            Justification::Vote(v) => v.candidate,
            Justification::Level(l) => l.candidate,
        }
    }

    pub fn location(&self) -> ElectionLocation {
        match self {
            Justification::Vote(v) => v.location,
            Justification::Level(l) => l.location,
        }
    }

    pub fn hash(&self) -> MessageHash {
        match self {
            Justification::Vote(v) => v.hash(),
            Justification::Level(l) => l.hash(),
        }
    }

    pub fn verify_with(&self, verifier: &dyn SignatureVerifier) -> bool {
        match self {
            Justification::Vote(v) => v.verify_with(verifier),
            Justification::Level(l) => l.verify_with(verifier),
        }
    }

    pub fn marshal(&self) -> Vec<u8> {
        match self {
            Justification::Vote(v) => v.marshal(),
            Justification::Level(l) => l.stripped().marshal(),
        }
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(bytes);
        let tag = r.peek_u8()?;
        let entry = if tag == MessageKind::Vote.tag() {
            Justification::Vote(VoteMessage::read(&mut r)?)
        } else if tag == MessageKind::Level.tag() {
            let level = LevelMessage::read_body(&mut r)?;
            // entries are one level deep; refuse before touching nested bytes
            if r.u32()? != 0 {
                return Err(CodecError::NestedJustification);
            }
            Justification::Level(level)
        } else {
            return Err(CodecError::InvalidJustificationEntry(tag));
        };
        r.finish()?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::{Ed25519Verifier, KeyPairSigner, MessageSigner};

    fn loc() -> ElectionLocation {
        ElectionLocation::new(12, 6, 2, 0)
    }

    fn vote(seed: u8) -> VoteMessage {
        let signer = KeyPairSigner::from_seed(&[seed; 32]);
        let mut v = VoteMessage {
            location: loc(),
            timestamp: Timestamp::new(10),
            signer: signer.identity(),
            volunteer: MessageHash::new([0xAA; 32]),
            candidate: Identity::new([0xCC; 32]),
            signature: Signature::EMPTY,
        };
        v.sign_with(&signer);
        v
    }

    fn claim(seed: u8, rank: u32, priority: u32, justification: Vec<Justification>) -> LevelMessage {
        let signer = KeyPairSigner::from_seed(&[seed; 32]);
        let mut l = LevelMessage {
            location: loc(),
            timestamp: Timestamp::new(20),
            signer: signer.identity(),
            candidate: Identity::new([0xCC; 32]),
            volunteer: MessageHash::new([0xAA; 32]),
            rank,
            level: rank,
            volunteer_priority: priority,
            committed: false,
            eom_from: None,
            signature: Signature::EMPTY,
            justification,
        };
        l.sign_with(&signer);
        l
    }

    #[test]
    fn higher_rank_wins() {
        assert!(claim(1, 1, 0, vec![]).less(&claim(1, 2, 5, vec![])));
        assert!(!claim(1, 2, 5, vec![]).less(&claim(1, 1, 0, vec![])));
    }

    #[test]
    fn smaller_priority_wins_at_equal_rank() {
        let strong = claim(1, 3, 0, vec![]);
        let weak = claim(2, 3, 2, vec![]);
        assert!(weak.less(&strong));
        assert!(!strong.less(&weak));
    }

    #[test]
    fn equal_claims_are_not_less() {
        let a = claim(1, 2, 1, vec![]);
        let b = claim(2, 2, 1, vec![]);
        assert!(!a.less(&b));
        assert!(!b.less(&a));
    }

    #[test]
    fn roundtrip_with_justification() {
        let inner = claim(3, 1, 0, vec![Justification::Vote(vote(1))]);
        let mut outer = claim(
            4,
            2,
            0,
            vec![
                Justification::Level(inner.stripped()),
                Justification::Vote(vote(2)),
            ],
        );
        outer.committed = true;
        outer.eom_from = Some(outer.signer);
        let signer = KeyPairSigner::from_seed(&[4; 32]);
        outer.sign_with(&signer);

        let decoded = LevelMessage::unmarshal(&outer.marshal()).unwrap();
        assert_eq!(decoded, outer);
        assert!(decoded.verify_all(&Ed25519Verifier));
    }

    #[test]
    fn stripping_keeps_hash_and_signature() {
        let full = claim(5, 1, 1, vec![Justification::Vote(vote(1)), Justification::Vote(vote(2))]);
        let stripped = full.stripped();
        assert_eq!(full.hash(), stripped.hash());
        assert!(stripped.verify_with(&Ed25519Verifier));
    }

    #[test]
    fn nested_justification_rejected() {
        let nested = claim(3, 1, 0, vec![Justification::Vote(vote(1))]);
        // Bypass `Justification::marshal`, which strips on the way out.
        let mut w = Writer::new();
        nested.write_signable(&mut w);
        w.put_signature(&nested.signature);
        w.put_u32(1);
        w.put_bytes(&vote(1).marshal());
        let entry_bytes = w.into_bytes();
        assert_eq!(
            Justification::unmarshal(&entry_bytes),
            Err(CodecError::NestedJustification)
        );
    }

    /// A claim whose single entry nests another claim `depth` times, built
    /// front to back so construction stays linear.
    fn deeply_nested(depth: usize) -> Vec<u8> {
        let base = claim(3, 1, 0, vec![]);
        let mut w = Writer::new();
        base.write_signable(&mut w);
        w.put_signature(&base.signature);
        let body = w.into_bytes();

        // lens[k]: encoded length of a claim wrapping k nested claims
        let mut lens = vec![body.len() + 4];
        for k in 1..=depth {
            lens.push(body.len() + 8 + lens[k - 1]);
        }
        let mut out = Writer::with_capacity(lens[depth]);
        for k in (1..=depth).rev() {
            out.put_raw(&body);
            out.put_u32(1);
            out.put_u32(lens[k - 1] as u32);
        }
        out.put_raw(&body);
        out.put_u32(0);
        out.into_bytes()
    }

    #[test]
    fn deep_nesting_is_refused_without_recursing() {
        let bytes = deeply_nested(3_000);
        // a stack far smaller than the default worker stack
        let verdict = std::thread::Builder::new()
            .stack_size(128 * 1024)
            .spawn(move || crate::ElectionMessage::unmarshal(&bytes))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(verdict, Err(CodecError::NestedJustification));
    }

    #[test]
    fn tampered_justification_entry_fails_verify_all() {
        let mut bad_vote = vote(1);
        bad_vote.candidate = Identity::new([0xDD; 32]);
        let outer = claim(4, 1, 0, vec![Justification::Vote(bad_vote)]);
        assert!(outer.verify_with(&Ed25519Verifier));
        assert!(!outer.verify_all(&Ed25519Verifier));
    }
}
