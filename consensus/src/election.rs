//! Election state machine: replaces one faulted leader with a candidate.
//!
//! A candidate volunteers, leaders vote for it, and once a majority of votes
//! for one candidate in the current round is visible a leader issues a
//! rank-1 Level claim. Claims climb in rank:
//!
//! - a majority of claims for one candidate at rank `r` commits it, and each
//!   leader that sees this issues a committed claim at rank `r + 1`;
//! - when no candidate can still reach a majority at rank `r`, a leader
//!   escalates to rank `r + 1` for the best-priority candidate it saw there.
//!
//! Every leader issues at most one claim per rank, so two majorities at the
//! same rank always overlap in an honest leader. A majority and an escalation
//! at the same rank cannot coexist. Together these keep every node committing
//! the same candidate.
//!
//! Rank-1 claims only count votes cast in the election's current round. A
//! locked leader votes for nothing but its own candidate, so two live leaders
//! cannot end up holding rank-1 claims for different candidates through votes
//! that straddled a round change.
//!
//! The state machine is pure: it never signs, sends, or reads a clock.
//! [`Election::execute`] returns a [`Draft`] that the adapter turns into a
//! signed message and feeds back through [`Election::record_own`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use fedvote_messages::{
    ElectionLocation, ElectionMessage, FaultMessage, Justification, KeyOrder, LevelMessage,
    VolunteerMessage, VoteMessage,
};
use fedvote_types::{Identity, MessageHash};

use crate::diagnostics::{LevelEntry, VoteHistory};
use crate::equivocation::{
    best_priority, majority_impossible, ClaimBook, ClaimRecord, EquivocationProof,
};
use crate::error::ElectionError;
use crate::roster::AuthSet;

/// Outcome of checking a message against the election's position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Validity {
    Accept,
    /// Belongs to a later round or election; hold it and retry.
    Defer,
    Reject(ElectionError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ElectionPhase {
    Idle,
    Volunteering,
    Voting,
    Leveling,
    Committed,
}

/// An unsigned Level claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelDraft {
    pub candidate: Identity,
    pub volunteer: MessageHash,
    pub rank: u32,
    pub level: u32,
    pub volunteer_priority: u32,
    pub committed: bool,
    pub eom_from: Option<Identity>,
    /// Hashes of the votes or claims that justify this one.
    pub justification: Vec<MessageHash>,
}

/// What the election wants the adapter to sign and send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Draft {
    Vote {
        volunteer: MessageHash,
        candidate: Identity,
    },
    Level(LevelDraft),
    /// Re-send an already signed message.
    Relay(MessageHash),
}

/// This node's latest claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OwnClaim {
    pub rank: u32,
    pub level: u32,
    pub candidate: Identity,
    pub priority: u32,
    pub committed: bool,
    /// Set once the signed claim has been recorded.
    pub hash: Option<MessageHash>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Election {
    owner: Identity,
    location: ElectionLocation,
    faulted: Identity,
    roster: AuthSet,
    observer: bool,
    phase: ElectionPhase,
    /// candidate → latest volunteer hash
    volunteers: HashMap<Identity, MessageHash>,
    voted_round: Option<u32>,
    /// candidate → leader → (round, vote hash) of that leader's latest vote
    votes: HashMap<Identity, BTreeMap<Identity, (u32, MessageHash)>>,
    claims: ClaimBook,
    current: Option<OwnClaim>,
    next_level: u32,
    /// Leader whose committed claim this node first saw.
    anchor: Option<Identity>,
    committed: Option<Identity>,
    history: VoteHistory,
}

impl Election {
    /// `owner` takes part as a leader when the roster lists it as one, and
    /// observes otherwise.
    pub fn new(
        owner: Identity,
        location: ElectionLocation,
        faulted: Identity,
        roster: AuthSet,
    ) -> Self {
        let observer = !roster.is_leader(&owner);
        let history = VoteHistory::new(roster.leaders().to_vec());
        Self {
            owner,
            location,
            faulted,
            roster,
            observer,
            phase: ElectionPhase::Idle,
            volunteers: HashMap::new(),
            voted_round: None,
            votes: HashMap::new(),
            claims: ClaimBook::new(),
            current: None,
            next_level: 1,
            anchor: None,
            committed: None,
            history,
        }
    }

    pub fn owner(&self) -> Identity {
        self.owner
    }

    pub fn location(&self) -> ElectionLocation {
        self.location
    }

    pub fn faulted(&self) -> Identity {
        self.faulted
    }

    pub fn roster(&self) -> &AuthSet {
        &self.roster
    }

    pub fn is_observer(&self) -> bool {
        self.observer
    }

    pub fn phase(&self) -> ElectionPhase {
        self.phase
    }

    pub fn is_committed(&self) -> bool {
        self.committed.is_some()
    }

    pub fn committed_candidate(&self) -> Option<Identity> {
        self.committed
    }

    pub fn current_claim(&self) -> Option<OwnClaim> {
        self.current
    }

    pub fn history(&self) -> &VoteHistory {
        &self.history
    }

    pub fn claims(&self) -> &ClaimBook {
        &self.claims
    }

    pub fn equivocations(&self) -> &[EquivocationProof] {
        self.claims.proofs()
    }

    /// Distinct leaders that voted for `candidate` in any round.
    pub fn vote_count(&self, candidate: &Identity) -> usize {
        self.votes.get(candidate).map(|v| v.len()).unwrap_or(0)
    }

    /// Leaders whose vote for `candidate` was cast in the current round.
    pub fn round_vote_count(&self, candidate: &Identity) -> usize {
        self.round_votes(candidate).count()
    }

    fn round_votes(&self, candidate: &Identity) -> impl Iterator<Item = MessageHash> + '_ {
        let round = self.location.round;
        self.votes
            .get(candidate)
            .into_iter()
            .flat_map(|voters| voters.values())
            .filter(move |(r, _)| *r == round)
            .map(|(_, hash)| *hash)
    }

    pub fn volunteer_hash(&self, candidate: &Identity) -> Option<MessageHash> {
        self.volunteers.get(candidate).copied()
    }

    /// Classify a message against the election's key and round.
    ///
    /// Volunteers and votes are tied to a round; Level claims persist across
    /// rounds. A Fault comes from this node's own timer or from a leader
    /// whose timer ran ahead; either moves the election to the Fault's round.
    pub fn validate(&self, msg: &ElectionMessage) -> Validity {
        let location = msg.location();
        match location.key().compare_to(&self.location.key()) {
            KeyOrder::Past => return Validity::Reject(self.stale(location)),
            KeyOrder::Future => return Validity::Defer,
            KeyOrder::OtherSlot => {
                return Validity::Reject(ElectionError::OtherSlot { location })
            }
            KeyOrder::Current => {}
        }

        match msg {
            ElectionMessage::Volunteer(v) => {
                if let Some(verdict) = self.check_round(location) {
                    return verdict;
                }
                if v.faulted != self.faulted {
                    return Validity::Reject(ElectionError::WrongFaultedLeader {
                        named: v.faulted,
                        expected: self.faulted,
                    });
                }
                if !self.roster.is_candidate(&v.candidate) {
                    return Validity::Reject(ElectionError::NotACandidate(v.candidate));
                }
            }
            ElectionMessage::Vote(v) => {
                if let Some(verdict) = self.check_round(location) {
                    return verdict;
                }
                if !self.roster.is_leader(&v.signer) {
                    return Validity::Reject(ElectionError::NotALeader(v.signer));
                }
                if !self.roster.is_candidate(&v.candidate) {
                    return Validity::Reject(ElectionError::NotACandidate(v.candidate));
                }
            }
            ElectionMessage::Level(l) => {
                if !self.roster.is_leader(&l.signer) {
                    return Validity::Reject(ElectionError::NotALeader(l.signer));
                }
                if let Err(err) = self.check_claimed_candidate(l) {
                    return Validity::Reject(err);
                }
            }
            ElectionMessage::Fault(f) => {
                if f.signer != self.owner && !self.roster.is_leader(&f.signer) {
                    return Validity::Reject(ElectionError::ForeignFault(f.signer));
                }
                if f.faulted != self.faulted {
                    return Validity::Reject(ElectionError::WrongFaultedLeader {
                        named: f.faulted,
                        expected: self.faulted,
                    });
                }
                if location.round < self.location.round {
                    return Validity::Reject(self.stale(location));
                }
            }
        }
        Validity::Accept
    }

    /// Apply a message from the network (or this node's own Fault event).
    ///
    /// Deferred messages are a no-op here; the adapter holds them. A rejected
    /// message leaves the election unchanged, apart from recording an
    /// equivocation proof.
    pub fn execute(&mut self, msg: &ElectionMessage) -> Result<Option<Draft>, ElectionError> {
        match self.validate(msg) {
            Validity::Accept => {}
            Validity::Defer => return Ok(None),
            Validity::Reject(err) => return Err(err),
        }
        if self.committed.is_some() {
            return Ok(None);
        }
        let hash = msg.hash();
        match msg {
            ElectionMessage::Volunteer(v) => Ok(self.on_volunteer(hash, v)),
            ElectionMessage::Vote(v) => Ok(self.on_vote(hash, v)),
            ElectionMessage::Level(l) => self.on_level(hash, l),
            ElectionMessage::Fault(f) => Ok(self.on_fault(f)),
        }
    }

    /// Ingest a message this node signed from one of its own drafts, then
    /// decide again.
    pub fn record_own(&mut self, msg: &ElectionMessage) -> Option<Draft> {
        let hash = msg.hash();
        match msg {
            ElectionMessage::Vote(v) => {
                self.ingest_vote(v.signer, v.candidate, v.location.round, hash);
                self.advance(ElectionPhase::Voting);
            }
            ElectionMessage::Level(l) => {
                if let Some(current) = self.current.as_mut() {
                    if current.level == l.level {
                        current.hash = Some(hash);
                    }
                }
                self.ingest_claim(claim_record(hash, l), l.eom_from);
            }
            ElectionMessage::Volunteer(_) | ElectionMessage::Fault(_) => {}
        }
        self.decide()
    }

    fn on_volunteer(&mut self, hash: MessageHash, v: &VolunteerMessage) -> Option<Draft> {
        self.advance(ElectionPhase::Volunteering);
        self.volunteers.insert(v.candidate, hash);

        if self.observer || self.voted_round == Some(self.location.round) {
            return None;
        }
        if let Some(current) = &self.current {
            if current.candidate != v.candidate {
                return None;
            }
        }
        self.voted_round = Some(self.location.round);
        let round = self.location.round;
        let already = self
            .votes
            .get(&v.candidate)
            .and_then(|voters| voters.get(&self.owner))
            .is_some_and(|(r, _)| *r == round);
        if already {
            return None;
        }
        Some(Draft::Vote {
            volunteer: hash,
            candidate: v.candidate,
        })
    }

    fn on_vote(&mut self, hash: MessageHash, v: &VoteMessage) -> Option<Draft> {
        self.advance(ElectionPhase::Voting);
        self.volunteers.entry(v.candidate).or_insert(v.volunteer);
        if self.ingest_vote(v.signer, v.candidate, v.location.round, hash) {
            self.decide()
        } else {
            None
        }
    }

    fn on_level(
        &mut self,
        hash: MessageHash,
        l: &LevelMessage,
    ) -> Result<Option<Draft>, ElectionError> {
        self.check_justification(l)?;

        let record = claim_record(hash, l);
        let mut batch: Vec<ClaimRecord> = l
            .justification
            .iter()
            .filter_map(|entry| match entry {
                Justification::Level(e) => Some(claim_record(entry.hash(), e)),
                Justification::Vote(_) => None,
            })
            .collect();
        batch.push(record);
        if let Err(proof) = self.claims.check_batch(&batch) {
            tracing::warn!(
                leader = %proof.leader,
                rank = proof.rank,
                level = proof.level,
                "equivocating claim rejected"
            );
            let err = ElectionError::Equivocation {
                leader: proof.leader,
                what: "rank",
                value: proof.rank,
            };
            self.claims.note_proof(proof);
            return Err(err);
        }

        for entry in &l.justification {
            match entry {
                Justification::Vote(v) => {
                    self.volunteers.entry(v.candidate).or_insert(v.volunteer);
                    self.ingest_vote(v.signer, v.candidate, v.location.round, entry.hash());
                }
                Justification::Level(e) => {
                    self.volunteers.entry(e.candidate).or_insert(e.volunteer);
                    self.ingest_claim(claim_record(entry.hash(), e), e.eom_from);
                }
            }
        }
        self.ingest_claim(record, l.eom_from);
        self.volunteers.entry(l.candidate).or_insert(l.volunteer);
        if l.committed && self.anchor.is_none() {
            self.anchor = Some(l.signer);
        }
        self.advance(ElectionPhase::Leveling);
        Ok(self.decide())
    }

    fn on_fault(&mut self, f: &FaultMessage) -> Option<Draft> {
        if f.location.round <= self.location.round {
            return None;
        }
        tracing::debug!(
            from = %self.location,
            to = f.location.round,
            by = %f.signer,
            "election round advanced"
        );
        self.location.round = f.location.round;
        self.voted_round = None;
        if self.observer {
            return None;
        }
        self.current.and_then(|c| c.hash).map(Draft::Relay)
    }

    /// Pick the next claim, if any: commit, escalate, or make a first claim
    /// from votes, in that order.
    fn decide(&mut self) -> Option<Draft> {
        if self.committed.is_some() {
            return None;
        }
        let majority = self.roster.majority();

        if let Some((rank, candidate, records)) = self.claims.highest_majority(majority) {
            self.committed = Some(candidate);
            self.advance(ElectionPhase::Committed);
            tracing::info!(
                location = %self.location,
                candidate = %candidate,
                rank,
                "election committed"
            );
            if self.observer {
                return None;
            }
            let commit_rank = rank + 1;
            if self.current.is_some_and(|c| c.rank >= commit_rank) {
                tracing::warn!(
                    location = %self.location,
                    commit_rank,
                    "own claim already above commit rank, committing without a claim"
                );
                return None;
            }
            let justification = records.iter().take(majority).map(|r| r.hash).collect();
            return Some(self.issue(commit_rank, candidate, true, justification));
        }

        if self.observer {
            return None;
        }

        let current_rank = self.current.map(|c| c.rank).unwrap_or(0);
        let leaders = self.roster.leaders().len();
        for rank in self.claims.ranks_desc() {
            if rank < current_rank {
                break;
            }
            let claims = self.claims.at_rank(rank);
            if majority_impossible(&claims, leaders, majority) {
                let pick = best_priority(&claims)?.candidate;
                let justification = claims.iter().map(|c| c.hash).collect();
                return Some(self.issue(rank + 1, pick, false, justification));
            }
        }

        if self.current.is_none() {
            let mut eligible: Vec<(u32, Identity)> = self
                .votes
                .keys()
                .filter(|c| self.round_vote_count(c) >= majority)
                .filter_map(|c| self.roster.volunteer_priority(c).map(|p| (p, *c)))
                .collect();
            eligible.sort_unstable();
            let (_, candidate) = eligible.first().copied()?;
            let justification = self.round_votes(&candidate).take(majority).collect();
            return Some(self.issue(1, candidate, false, justification));
        }

        None
    }

    fn issue(
        &mut self,
        rank: u32,
        candidate: Identity,
        committed: bool,
        justification: Vec<MessageHash>,
    ) -> Draft {
        let level = self.next_level;
        self.next_level += 1;
        let priority = self
            .roster
            .volunteer_priority(&candidate)
            .unwrap_or(u32::MAX);
        let volunteer = self
            .volunteers
            .get(&candidate)
            .copied()
            .unwrap_or(MessageHash::ZERO);
        let eom_from = committed.then(|| self.anchor.unwrap_or(self.owner));
        self.current = Some(OwnClaim {
            rank,
            level,
            candidate,
            priority,
            committed,
            hash: None,
        });
        self.advance(if committed {
            ElectionPhase::Committed
        } else {
            ElectionPhase::Leveling
        });
        tracing::debug!(
            location = %self.location,
            rank,
            level,
            priority,
            committed,
            "drafting claim"
        );
        Draft::Level(LevelDraft {
            candidate,
            volunteer,
            rank,
            level,
            volunteer_priority: priority,
            committed,
            eom_from,
            justification,
        })
    }

    fn check_justification(&self, l: &LevelMessage) -> Result<(), ElectionError> {
        let invalid = |why: String| Err(ElectionError::InvalidJustification(why));
        if l.rank == 0 {
            return invalid("claim at rank 0".into());
        }
        let key = self.location.key();
        let mut signers = HashSet::new();
        for entry in &l.justification {
            if entry.location().key() != key {
                return invalid(format!("entry from election {}", entry.location().key()));
            }
            let signer = entry.signer();
            if !self.roster.is_leader(&signer) {
                return Err(ElectionError::NotALeader(signer));
            }
            if !signers.insert(signer) {
                return invalid(format!("{} appears twice", signer));
            }
        }

        let majority = self.roster.majority();
        if l.rank == 1 {
            if l.committed {
                return invalid("committed claim at rank 1".into());
            }
            let mut supporting = 0;
            for entry in &l.justification {
                match entry {
                    Justification::Vote(v) if v.candidate == l.candidate => supporting += 1,
                    Justification::Vote(_) => {}
                    Justification::Level(_) => {
                        return invalid("rank-1 claim justified by a claim".into())
                    }
                }
            }
            if supporting < majority {
                return invalid(format!("{} votes, need {}", supporting, majority));
            }
            return Ok(());
        }

        let mut claims = Vec::with_capacity(l.justification.len());
        for entry in &l.justification {
            let Justification::Level(e) = entry else {
                return invalid(format!("rank-{} claim justified by a vote", l.rank));
            };
            if e.rank != l.rank - 1 {
                return invalid(format!("entry at rank {}, expected {}", e.rank, l.rank - 1));
            }
            self.check_claimed_candidate(e)?;
            claims.push(claim_record(entry.hash(), e));
        }

        if l.committed {
            let supporting = claims.iter().filter(|c| c.candidate == l.candidate).count();
            if supporting < majority {
                return invalid(format!(
                    "commit backed by {} claims, need {}",
                    supporting, majority
                ));
            }
        } else {
            if !majority_impossible(&claims, self.roster.leaders().len(), majority) {
                return invalid("escalation while a majority is still reachable".into());
            }
            if best_priority(&claims).map(|c| c.candidate) != Some(l.candidate) {
                return invalid("escalated to a candidate other than the best priority".into());
            }
        }
        Ok(())
    }

    fn check_claimed_candidate(&self, l: &LevelMessage) -> Result<(), ElectionError> {
        match self.roster.volunteer_priority(&l.candidate) {
            None => Err(ElectionError::NotACandidate(l.candidate)),
            Some(p) if p != l.volunteer_priority => Err(ElectionError::PriorityMismatch {
                expected: p,
                got: l.volunteer_priority,
            }),
            Some(_) => Ok(()),
        }
    }

    fn check_round(&self, location: ElectionLocation) -> Option<Validity> {
        match location.round.cmp(&self.location.round) {
            Ordering::Less => Some(Validity::Reject(self.stale(location))),
            Ordering::Greater => Some(Validity::Defer),
            Ordering::Equal => None,
        }
    }

    fn stale(&self, location: ElectionLocation) -> ElectionError {
        ElectionError::Stale {
            location,
            current: self.location,
        }
    }

    fn ingest_vote(
        &mut self,
        leader: Identity,
        candidate: Identity,
        round: u32,
        hash: MessageHash,
    ) -> bool {
        let voters = self.votes.entry(candidate).or_default();
        if voters.get(&leader).is_some_and(|(r, _)| *r >= round) {
            return false;
        }
        voters.insert(leader, (round, hash));
        if let Some(priority) = self.roster.volunteer_priority(&candidate) {
            self.history.record_vote(leader, priority);
        }
        true
    }

    fn ingest_claim(&mut self, record: ClaimRecord, eom_from: Option<Identity>) {
        if let Ok(true) = self.claims.insert(record) {
            self.history.record_level(
                record.leader,
                LevelEntry {
                    level: record.level,
                    rank: record.rank,
                    candidate: record.candidate,
                    priority: record.priority,
                    committed: record.committed,
                    eom_from,
                },
            );
        }
    }

    fn advance(&mut self, phase: ElectionPhase) {
        if phase > self.phase {
            self.phase = phase;
        }
    }
}

fn claim_record(hash: MessageHash, l: &LevelMessage) -> ClaimRecord {
    ClaimRecord {
        hash,
        leader: l.signer,
        candidate: l.candidate,
        rank: l.rank,
        level: l.level,
        priority: l.volunteer_priority,
        committed: l.committed,
    }
}
