//! Bridge between the pure [`Election`] and signed network messages.
//!
//! The adapter verifies signatures, defers messages that arrive early, turns
//! drafts into signed messages, and produces the roster swap exactly once
//! when the election commits. Once resolved it answers a peer's Fault with
//! the claims that prove the outcome, so a node that lost every commit still
//! learns it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use fedvote_messages::{
    ElectionKey, ElectionMessage, FaultMessage, Justification, LevelMessage, MessageKind,
    MessageSigner, SignatureVerifier, VolunteerMessage, VoteMessage,
};
use fedvote_types::{Identity, MessageHash, Signature, Timestamp};

use crate::election::{Draft, Election, Validity};
use crate::error::ElectionError;
use crate::priority::expected_volunteer;
use crate::roster::{AuthSet, ElectionRoster, RosterSwap};

pub type SharedSigner = Arc<dyn MessageSigner + Send + Sync>;
pub type SharedVerifier = Arc<dyn SignatureVerifier + Send + Sync>;

/// Default bound on messages held for a later round.
pub const DEFAULT_MAX_DEFERRED: usize = 256;

#[derive(Clone, Copy, Debug)]
pub struct AdapterConfig {
    pub max_deferred: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            max_deferred: DEFAULT_MAX_DEFERRED,
        }
    }
}

/// Opaque data a volunteering candidate attaches: the faulted leader's
/// missing message and the candidate's acknowledgement of it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VolunteerPayload {
    pub missing: Vec<u8>,
    pub ack: Vec<u8>,
}

pub struct ElectionAdapter {
    key: ElectionKey,
    election: Election,
    live: ElectionRoster,
    signer: SharedSigner,
    verifier: SharedVerifier,
    payload: VolunteerPayload,
    /// Messages whose content this node holds, including justification
    /// entries, by hash.
    tagged: HashMap<MessageHash, ElectionMessage>,
    /// Top-level messages already processed.
    seen: HashSet<MessageHash>,
    volunteers: HashMap<Identity, VolunteerMessage>,
    deferred: VecDeque<ElectionMessage>,
    max_deferred: usize,
    fault_nonce: u64,
    volunteered_round: Option<u32>,
    processed: bool,
    swap: Option<RosterSwap>,
}

impl ElectionAdapter {
    /// Create the election for `key` against a snapshot of the live roster.
    /// The faulted leader is whichever leader serves `key.slot`.
    pub fn new(
        key: ElectionKey,
        live: ElectionRoster,
        signer: SharedSigner,
        verifier: SharedVerifier,
        config: AdapterConfig,
    ) -> Result<Self, ElectionError> {
        let faulted = live.leader_for_slot(&key).ok_or(ElectionError::NoLeaders)?;
        let location = key.at_round(0);
        let roster = AuthSet::for_election(&live, &location)?;
        let election = Election::new(signer.identity(), location, faulted, roster);
        Ok(Self {
            key,
            election,
            live,
            signer,
            verifier,
            payload: VolunteerPayload::default(),
            tagged: HashMap::new(),
            seen: HashSet::new(),
            volunteers: HashMap::new(),
            deferred: VecDeque::new(),
            max_deferred: config.max_deferred,
            fault_nonce: 0,
            volunteered_round: None,
            processed: false,
            swap: None,
        })
    }

    pub fn with_payload(mut self, payload: VolunteerPayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn key(&self) -> ElectionKey {
        self.key
    }

    pub fn election(&self) -> &Election {
        &self.election
    }

    pub fn owner(&self) -> Identity {
        self.election.owner()
    }

    pub fn round(&self) -> u32 {
        self.election.location().round
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    pub fn roster_swap(&self) -> Option<&RosterSwap> {
        self.swap.as_ref()
    }

    /// Hand the swap to the caller. Subsequent calls return `None`.
    pub fn take_roster_swap(&mut self) -> Option<RosterSwap> {
        self.swap.take()
    }

    /// Claims that make any recipient commit the same candidate: this node's
    /// own committed claim, else the full majority it committed on, else a
    /// committed claim it received. Empty while unresolved.
    pub fn commit_evidence(&self) -> Vec<ElectionMessage> {
        if !self.processed {
            return Vec::new();
        }
        let full = |hash: &MessageHash| {
            self.tagged
                .get(hash)
                .filter(|m| matches!(m, ElectionMessage::Level(l) if !l.justification.is_empty()))
                .cloned()
        };
        let own = self
            .election
            .current_claim()
            .filter(|c| c.committed)
            .and_then(|c| c.hash)
            .and_then(|hash| full(&hash));
        if let Some(own) = own {
            return vec![own];
        }
        let majority = self.election.roster().majority();
        if let Some((_, _, records)) = self.election.claims().highest_majority(majority) {
            let claims: Vec<ElectionMessage> =
                records.iter().filter_map(|r| full(&r.hash)).take(majority).collect();
            if claims.len() >= majority {
                return claims;
            }
        }
        self.tagged
            .values()
            .find(|m| {
                matches!(m, ElectionMessage::Level(l) if l.committed && !l.justification.is_empty())
            })
            .cloned()
            .into_iter()
            .collect()
    }

    /// The committed candidate's volunteer message, if it reached this node.
    pub fn committed_volunteer(&self) -> Option<&VolunteerMessage> {
        self.election
            .committed_candidate()
            .and_then(|c| self.volunteers.get(&c))
    }

    /// Kick off round 0: a candidate that is first in the round's priority
    /// order volunteers. Leaders wait for a volunteer.
    pub fn start(&mut self, now: Timestamp) -> Option<ElectionMessage> {
        if self.processed {
            return None;
        }
        self.volunteer_if_expected(now)
    }

    /// Process a message from the network and return what to broadcast.
    ///
    /// A volunteer, vote or claim yields at most one message: drafts that
    /// build on each other collapse into the most advanced. A leader's Fault
    /// that moves this election to a later round can yield several
    /// independent messages (own claim relayed, a volunteer, votes for
    /// replayed volunteers). Once resolved, a Fault is answered with
    /// [`commit_evidence`](Self::commit_evidence) and anything else ignored.
    pub fn execute(&mut self, msg: ElectionMessage, now: Timestamp) -> Vec<ElectionMessage> {
        if self.processed {
            if msg.kind() == MessageKind::Fault && msg.verify_with(&*self.verifier) {
                tracing::debug!(key = %self.key, peer = %msg.signer(), "peer still running, resending outcome");
                return self.commit_evidence();
            }
            tracing::trace!(key = %self.key, kind = %msg.kind(), "election resolved, ignoring");
            return Vec::new();
        }
        if !msg.verify_with(&*self.verifier) {
            tracing::warn!(
                key = %self.key,
                signer = %msg.signer(),
                kind = %msg.kind(),
                "dropping message with invalid signature"
            );
            return Vec::new();
        }
        self.process_verified(msg, now)
    }

    /// The round timer expired: advance to the next round through a signed
    /// Fault event of this node's own.
    ///
    /// The Fault is broadcast first. A leader's Fault pulls peers whose
    /// timers lag behind up to its round, and any Fault makes resolved peers
    /// resend the outcome.
    pub fn timeout(&mut self, now: Timestamp) -> Vec<ElectionMessage> {
        if self.processed {
            return Vec::new();
        }
        let next = self.election.location().round + 1;
        self.fault_nonce += 1;
        let mut fault = ElectionMessage::Fault(FaultMessage {
            location: self.election.location().with_round(next),
            timestamp: now,
            faulted: self.election.faulted(),
            signer: self.signer.identity(),
            nonce: self.fault_nonce,
            signature: Signature::EMPTY,
        });
        fault.sign_with(&*self.signer);
        let mut out = vec![fault.clone()];
        out.extend(self.process_verified(fault, now));
        out
    }

    fn process_verified(&mut self, msg: ElectionMessage, now: Timestamp) -> Vec<ElectionMessage> {
        let mut out = Vec::new();
        match self.election.validate(&msg) {
            Validity::Accept => {}
            Validity::Defer => {
                self.defer(msg);
                return out;
            }
            Validity::Reject(err) => {
                tracing::debug!(key = %self.key, kind = %msg.kind(), %err, "message rejected");
                return out;
            }
        }
        if let ElectionMessage::Volunteer(v) = &msg {
            if let Err(err) = self.check_volunteer_indices(v) {
                tracing::debug!(key = %self.key, %err, "volunteer rejected");
                return out;
            }
        }
        if self.seen.contains(&msg.hash()) {
            tracing::trace!(key = %self.key, kind = %msg.kind(), "duplicate message");
            return out;
        }

        let round = self.round();
        let draft = match self.election.execute(&msg) {
            Ok(draft) => draft,
            Err(err) => {
                tracing::debug!(key = %self.key, kind = %msg.kind(), %err, "message rejected");
                return out;
            }
        };
        self.tag(&msg);
        out.extend(self.realize(draft, now));

        if self.round() > round {
            if msg.signer() != self.owner() {
                tracing::debug!(
                    key = %self.key,
                    from = round,
                    to = self.round(),
                    leader = %msg.signer(),
                    "caught up to a peer's round"
                );
            }
            out.extend(self.volunteer_if_expected(now));
            out.extend(self.replay_deferred(now));
        }
        self.check_commit();
        out
    }

    /// Sign drafts and feed them back until the election has nothing more
    /// to say. Each draft supersedes the previous one.
    fn realize(&mut self, draft: Option<Draft>, now: Timestamp) -> Option<ElectionMessage> {
        let mut latest = None;
        let mut next = draft;
        while let Some(draft) = next.take() {
            let msg = match self.expand(draft, now) {
                Ok(msg) => msg,
                Err(err) => {
                    tracing::warn!(key = %self.key, %err, "could not build message from draft");
                    break;
                }
            };
            self.tag(&msg);
            next = self.election.record_own(&msg);
            latest = Some(msg);
        }
        latest
    }

    fn expand(&self, draft: Draft, now: Timestamp) -> Result<ElectionMessage, ElectionError> {
        let location = self.election.location();
        let signer = self.signer.identity();
        let mut msg = match draft {
            Draft::Relay(hash) => {
                return self
                    .tagged
                    .get(&hash)
                    .cloned()
                    .ok_or(ElectionError::UnresolvedReference(hash));
            }
            Draft::Vote {
                volunteer,
                candidate,
            } => ElectionMessage::Vote(VoteMessage {
                location,
                timestamp: now,
                signer,
                volunteer,
                candidate,
                signature: Signature::EMPTY,
            }),
            Draft::Level(d) => {
                let justification = d
                    .justification
                    .iter()
                    .map(|hash| self.justification_entry(hash))
                    .collect::<Result<Vec<_>, _>>()?;
                ElectionMessage::Level(LevelMessage {
                    location,
                    timestamp: now,
                    signer,
                    candidate: d.candidate,
                    volunteer: d.volunteer,
                    rank: d.rank,
                    level: d.level,
                    volunteer_priority: d.volunteer_priority,
                    committed: d.committed,
                    eom_from: d.eom_from,
                    signature: Signature::EMPTY,
                    justification,
                })
            }
        };
        msg.sign_with(&*self.signer);
        Ok(msg)
    }

    fn justification_entry(&self, hash: &MessageHash) -> Result<Justification, ElectionError> {
        match self.tagged.get(hash) {
            Some(ElectionMessage::Vote(v)) => Ok(Justification::Vote(v.clone())),
            Some(ElectionMessage::Level(l)) => Ok(Justification::Level(l.stripped())),
            _ => Err(ElectionError::UnresolvedReference(*hash)),
        }
    }

    fn tag(&mut self, msg: &ElectionMessage) {
        let hash = msg.hash();
        self.seen.insert(hash);
        match msg {
            ElectionMessage::Level(l) => {
                for entry in &l.justification {
                    let cached = match entry {
                        Justification::Vote(v) => ElectionMessage::Vote(v.clone()),
                        Justification::Level(e) => ElectionMessage::Level(e.clone()),
                    };
                    self.tagged.entry(entry.hash()).or_insert(cached);
                }
            }
            ElectionMessage::Volunteer(v) => {
                self.volunteers.insert(v.candidate, v.clone());
            }
            ElectionMessage::Vote(_) | ElectionMessage::Fault(_) => {}
        }
        if !matches!(msg, ElectionMessage::Fault(_)) {
            self.tagged.insert(hash, msg.clone());
        }
    }

    fn volunteer_if_expected(&mut self, now: Timestamp) -> Option<ElectionMessage> {
        let owner = self.signer.identity();
        let location = self.election.location();
        if self.processed
            || !self.election.roster().is_candidate(&owner)
            || self.volunteered_round == Some(location.round)
        {
            return None;
        }
        if expected_volunteer(self.election.roster().candidates(), &location) != Some(owner) {
            return None;
        }
        let faulted = self.election.faulted();
        let (Some(faulted_index), Some(candidate_index)) = (
            self.live.leader_index(&faulted),
            self.live.candidate_index(&owner),
        ) else {
            tracing::warn!(key = %self.key, "own identity missing from live roster, not volunteering");
            return None;
        };
        self.volunteered_round = Some(location.round);

        let mut msg = ElectionMessage::Volunteer(VolunteerMessage {
            location,
            timestamp: now,
            faulted,
            faulted_index,
            candidate: owner,
            candidate_index,
            missing: self.payload.missing.clone(),
            ack: self.payload.ack.clone(),
            signature: Signature::EMPTY,
        });
        msg.sign_with(&*self.signer);
        tracing::info!(key = %self.key, round = location.round, "volunteering to replace faulted leader");
        self.process_verified(msg.clone(), now);
        Some(msg)
    }

    fn check_volunteer_indices(&self, v: &VolunteerMessage) -> Result<(), ElectionError> {
        let faulted = self.live.leader_index(&v.faulted);
        if faulted != Some(v.faulted_index) {
            return Err(ElectionError::IndexMismatch {
                field: "faulted",
                expected: faulted.unwrap_or(u32::MAX),
                got: v.faulted_index,
            });
        }
        let candidate = self.live.candidate_index(&v.candidate);
        if candidate != Some(v.candidate_index) {
            return Err(ElectionError::IndexMismatch {
                field: "candidate",
                expected: candidate.unwrap_or(u32::MAX),
                got: v.candidate_index,
            });
        }
        Ok(())
    }

    fn defer(&mut self, msg: ElectionMessage) {
        if self.deferred.len() >= self.max_deferred {
            self.deferred.pop_front();
            tracing::debug!(key = %self.key, "deferred queue full, dropping oldest");
        }
        self.deferred.push_back(msg);
    }

    fn replay_deferred(&mut self, now: Timestamp) -> Vec<ElectionMessage> {
        let pending: Vec<ElectionMessage> = self.deferred.drain(..).collect();
        pending
            .into_iter()
            .flat_map(|msg| self.process_verified(msg, now))
            .collect()
    }

    fn check_commit(&mut self) {
        if self.processed {
            return;
        }
        let Some(candidate) = self.election.committed_candidate() else {
            return;
        };
        self.processed = true;
        self.deferred.clear();
        let faulted = self.election.faulted();
        match (
            self.live.leader_index(&faulted),
            self.live.candidate_index(&candidate),
        ) {
            (Some(faulted_index), Some(candidate_index)) => {
                tracing::info!(
                    key = %self.key,
                    faulted = %faulted,
                    candidate = %candidate,
                    "roster swap ready"
                );
                self.swap = Some(RosterSwap {
                    key: self.key,
                    faulted,
                    faulted_index,
                    candidate,
                    candidate_index,
                });
            }
            _ => tracing::error!(
                key = %self.key,
                "committed candidate or faulted leader missing from live roster"
            ),
        }
    }
}
