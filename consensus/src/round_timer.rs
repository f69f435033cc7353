//! Round deadlines for active elections.
//!
//! Each election has at most one armed deadline. When it passes, the owner
//! issues a Fault event to move the election to its next round and re-arms.

use std::collections::{BTreeMap, HashMap};

use fedvote_messages::ElectionKey;
use fedvote_types::Timestamp;

pub const DEFAULT_ROUND_TIMEOUT_MS: u64 = 5_000;

pub struct RoundTimers {
    round_timeout_ms: u64,
    /// (deadline millis, sequence) → election
    deadlines: BTreeMap<(u64, u64), ElectionKey>,
    by_key: HashMap<ElectionKey, (u64, u64)>,
    seq: u64,
}

impl RoundTimers {
    pub fn new(round_timeout_ms: u64) -> Self {
        Self {
            round_timeout_ms,
            deadlines: BTreeMap::new(),
            by_key: HashMap::new(),
            seq: 0,
        }
    }

    pub fn round_timeout_ms(&self) -> u64 {
        self.round_timeout_ms
    }

    /// Arm (or re-arm) the election's deadline one round timeout from `now`.
    pub fn arm(&mut self, key: ElectionKey, now: Timestamp) -> Timestamp {
        let deadline = now.plus_millis(self.round_timeout_ms);
        self.schedule(key, deadline);
        deadline
    }

    pub fn schedule(&mut self, key: ElectionKey, deadline: Timestamp) {
        self.cancel(&key);
        self.seq += 1;
        let slot = (deadline.as_millis(), self.seq);
        self.deadlines.insert(slot, key);
        self.by_key.insert(key, slot);
    }

    pub fn cancel(&mut self, key: &ElectionKey) -> bool {
        match self.by_key.remove(key) {
            Some(slot) => self.deadlines.remove(&slot).is_some(),
            None => false,
        }
    }

    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.deadlines
            .keys()
            .next()
            .map(|(millis, _)| Timestamp::new(*millis))
    }

    /// Disarm and return every election whose deadline is at or before `now`,
    /// earliest first.
    pub fn pop_expired(&mut self, now: Timestamp) -> Vec<ElectionKey> {
        let mut expired = Vec::new();
        while let Some(entry) = self.deadlines.first_entry() {
            if entry.key().0 > now.as_millis() {
                break;
            }
            let key = entry.remove();
            self.by_key.remove(&key);
            expired.push(key);
        }
        expired
    }

    pub fn is_armed(&self, key: &ElectionKey) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

impl Default for RoundTimers {
    fn default() -> Self {
        Self::new(DEFAULT_ROUND_TIMEOUT_MS)
    }
}
