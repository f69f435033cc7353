//! Active elections container: every election this node is running, keyed by
//! `(height, minute, slot)`.
//!
//! Routes incoming messages to their election, buffers messages for
//! elections that have not started yet, and retires elections once their
//! roster swap has been collected. A retired election keeps the claims that
//! prove its outcome and hands them to any peer whose Fault shows it is
//! still running.

use std::collections::HashMap;

use fedvote_messages::{ElectionKey, ElectionMessage, MessageKind};
use fedvote_types::Timestamp;
use fedvote_utils::StatsCounter;

use crate::adapter::{AdapterConfig, ElectionAdapter, SharedSigner, SharedVerifier, VolunteerPayload};
use crate::error::ElectionError;
use crate::pending::PendingMessages;
use crate::roster::{ElectionRoster, RosterSwap};

pub const DEFAULT_MAX_ELECTIONS: usize = 64;

pub const STAT_STARTED: &str = "elections_started";
pub const STAT_COMMITTED: &str = "elections_committed";
pub const STAT_ROUTED: &str = "messages_routed";
pub const STAT_BUFFERED: &str = "messages_buffered";
pub const STAT_DROPPED: &str = "messages_dropped";
pub const STAT_ROUNDS: &str = "rounds_advanced";
pub const STAT_RESENT: &str = "outcomes_resent";

const STATS: &[&str] = &[
    STAT_STARTED,
    STAT_COMMITTED,
    STAT_ROUTED,
    STAT_BUFFERED,
    STAT_DROPPED,
    STAT_ROUNDS,
    STAT_RESENT,
];

pub struct ActiveElections {
    elections: HashMap<ElectionKey, ElectionAdapter>,
    early: PendingMessages,
    /// Retired elections and the claims proving their outcome.
    finished: HashMap<ElectionKey, Vec<ElectionMessage>>,
    signer: SharedSigner,
    verifier: SharedVerifier,
    config: AdapterConfig,
    max_elections: usize,
    stats: StatsCounter,
}

impl ActiveElections {
    pub fn new(
        signer: SharedSigner,
        verifier: SharedVerifier,
        max_elections: usize,
        config: AdapterConfig,
        early: PendingMessages,
    ) -> Self {
        Self {
            elections: HashMap::new(),
            early,
            finished: HashMap::new(),
            signer,
            verifier,
            config,
            max_elections,
            stats: StatsCounter::new(STATS),
        }
    }

    /// Start the election for `key` and replay anything buffered for it.
    ///
    /// Starting an election that is already running or finished is a no-op.
    /// Returns the messages to broadcast.
    pub fn start_election(
        &mut self,
        key: ElectionKey,
        roster: &ElectionRoster,
        payload: VolunteerPayload,
        now: Timestamp,
    ) -> Result<Vec<ElectionMessage>, ElectionError> {
        if self.elections.contains_key(&key) || self.finished.contains_key(&key) {
            return Ok(Vec::new());
        }
        if self.elections.len() >= self.max_elections {
            return Err(ElectionError::CapacityReached(self.max_elections));
        }

        let mut adapter = ElectionAdapter::new(
            key,
            roster.clone(),
            self.signer.clone(),
            self.verifier.clone(),
            self.config,
        )?
        .with_payload(payload);

        let mut out = Vec::new();
        if let Some(msg) = adapter.start(now) {
            out.push(msg);
        }
        let buffered = self.early.take(&key);
        tracing::debug!(%key, buffered = buffered.len(), "election started");
        for msg in buffered {
            out.extend(adapter.execute(msg, now));
        }
        self.stats.increment(STAT_STARTED);
        self.elections.insert(key, adapter);
        Ok(out)
    }

    /// Deliver a network message. Messages for elections that have not
    /// started are buffered. For finished ones a verified Fault is answered
    /// with the outcome and everything else is dropped.
    pub fn route(&mut self, msg: ElectionMessage, now: Timestamp) -> Vec<ElectionMessage> {
        let key = msg.location().key();
        if let Some(evidence) = self.finished.get(&key) {
            if msg.kind() == MessageKind::Fault && msg.verify_with(&*self.verifier) {
                tracing::debug!(%key, peer = %msg.signer(), "resending outcome of finished election");
                self.stats.increment(STAT_RESENT);
                return evidence.clone();
            }
            self.stats.increment(STAT_DROPPED);
            return Vec::new();
        }
        match self.elections.get_mut(&key) {
            Some(adapter) => {
                self.stats.increment(STAT_ROUTED);
                adapter.execute(msg, now)
            }
            None => {
                if self.early.insert(msg, now) {
                    self.stats.increment(STAT_BUFFERED);
                } else {
                    self.stats.increment(STAT_DROPPED);
                }
                Vec::new()
            }
        }
    }

    /// Round deadline passed for `key`.
    pub fn timeout(
        &mut self,
        key: &ElectionKey,
        now: Timestamp,
    ) -> Result<Vec<ElectionMessage>, ElectionError> {
        let adapter = self
            .elections
            .get_mut(key)
            .ok_or(ElectionError::ElectionNotFound(*key))?;
        self.stats.increment(STAT_ROUNDS);
        Ok(adapter.timeout(now))
    }

    /// Collect the roster swaps of elections that committed since the last
    /// call.
    pub fn take_swaps(&mut self) -> Vec<RosterSwap> {
        let mut swaps = Vec::new();
        for adapter in self.elections.values_mut() {
            if let Some(swap) = adapter.take_roster_swap() {
                self.stats.increment(STAT_COMMITTED);
                swaps.push(swap);
            }
        }
        swaps
    }

    /// Remove resolved elections, keeping only their commit evidence.
    pub fn retire_processed(&mut self) -> Vec<ElectionKey> {
        let done: Vec<ElectionKey> = self
            .elections
            .iter()
            .filter(|(_, a)| a.is_processed() && a.roster_swap().is_none())
            .map(|(k, _)| *k)
            .collect();
        for key in &done {
            if let Some(adapter) = self.elections.remove(key) {
                self.finished.insert(*key, adapter.commit_evidence());
            }
        }
        done
    }

    /// Forget elections, buffered messages and finished markers before
    /// `(height, minute)`.
    pub fn prune_before(&mut self, height: u32, minute: u8) -> usize {
        let older = |k: &ElectionKey| (k.height, k.minute) < (height, minute);
        let before = self.elections.len();
        self.elections.retain(|k, _| !older(k));
        self.finished.retain(|k, _| !older(k));
        let dropped = before - self.elections.len();
        dropped + self.early.prune_before(height, minute)
    }

    pub fn expire_buffered(&mut self, now: Timestamp) -> usize {
        self.early.expire(now)
    }

    pub fn get(&self, key: &ElectionKey) -> Option<&ElectionAdapter> {
        self.elections.get(key)
    }

    pub fn contains(&self, key: &ElectionKey) -> bool {
        self.elections.contains_key(key)
    }

    pub fn is_finished(&self, key: &ElectionKey) -> bool {
        self.finished.contains_key(key)
    }

    pub fn keys(&self) -> Vec<ElectionKey> {
        self.elections.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.elections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elections.is_empty()
    }

    pub fn buffered_len(&self) -> usize {
        self.early.len()
    }

    pub fn stats(&self) -> &StatsCounter {
        &self.stats
    }
}
