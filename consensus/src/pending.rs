//! Pre-election buffer: holds messages that arrive before the local node has
//! started the election they belong to.
//!
//! A peer can notice a missing message and broadcast its vote or volunteer
//! before this node's own trigger fires. Those messages are parked here and
//! replayed into the election when it starts.

use std::collections::{BTreeMap, HashMap, HashSet};

use fedvote_messages::{ElectionKey, ElectionMessage};
use fedvote_types::{MessageHash, Timestamp};

pub const DEFAULT_MAX_KEYS: usize = 1024;
pub const MAX_MESSAGES_PER_KEY: usize = 256;
pub const DEFAULT_TTL_MS: u64 = 120_000;

struct BufferEntry {
    messages: Vec<ElectionMessage>,
    hashes: HashSet<MessageHash>,
    first_seen: Timestamp,
}

/// Bounded, TTL-limited store of early election messages keyed by election.
pub struct PendingMessages {
    entries: HashMap<ElectionKey, BufferEntry>,
    /// first-seen millis → keys first seen then, for expiry in age order
    time_index: BTreeMap<u64, Vec<ElectionKey>>,
    max_keys: usize,
    ttl_ms: u64,
}

impl PendingMessages {
    pub fn new(max_keys: usize, ttl_ms: u64) -> Self {
        Self {
            entries: HashMap::new(),
            time_index: BTreeMap::new(),
            max_keys,
            ttl_ms,
        }
    }

    /// Buffer a message. Returns false when it was a duplicate or the
    /// election's buffer is full.
    pub fn insert(&mut self, msg: ElectionMessage, now: Timestamp) -> bool {
        let key = msg.location().key();
        if !self.entries.contains_key(&key) {
            self.expire(now);
            if self.entries.len() >= self.max_keys {
                self.evict_oldest();
            }
            self.entries.insert(
                key,
                BufferEntry {
                    messages: Vec::new(),
                    hashes: HashSet::new(),
                    first_seen: now,
                },
            );
            self.time_index.entry(now.as_millis()).or_default().push(key);
        }
        let Some(entry) = self.entries.get_mut(&key) else {
            return false;
        };
        if entry.messages.len() >= MAX_MESSAGES_PER_KEY || !entry.hashes.insert(msg.hash()) {
            return false;
        }
        entry.messages.push(msg);
        true
    }

    /// Remove and return everything buffered for `key`, in arrival order.
    pub fn take(&mut self, key: &ElectionKey) -> Vec<ElectionMessage> {
        match self.entries.remove(key) {
            Some(entry) => {
                self.unindex(key, entry.first_seen);
                entry.messages
            }
            None => Vec::new(),
        }
    }

    /// Drop elections first seen at least the TTL ago. Returns how many
    /// elections were dropped.
    pub fn expire(&mut self, now: Timestamp) -> usize {
        let ttl_ms = self.ttl_ms;
        let expired: Vec<u64> = self
            .time_index
            .keys()
            .copied()
            .take_while(|t| Timestamp::new(*t).has_expired(ttl_ms, now))
            .collect();
        let mut dropped = 0;
        for t in expired {
            if let Some(keys) = self.time_index.remove(&t) {
                for key in keys {
                    if self.entries.remove(&key).is_some() {
                        dropped += 1;
                    }
                }
            }
        }
        dropped
    }

    /// Drop everything for elections before `(height, minute)`.
    pub fn prune_before(&mut self, height: u32, minute: u8) -> usize {
        let stale: Vec<(ElectionKey, Timestamp)> = self
            .entries
            .iter()
            .filter(|(k, _)| (k.height, k.minute) < (height, minute))
            .map(|(k, e)| (*k, e.first_seen))
            .collect();
        for (key, first_seen) in &stale {
            self.entries.remove(key);
            self.unindex(key, *first_seen);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|e| e.messages.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn election_count(&self) -> usize {
        self.entries.len()
    }

    fn evict_oldest(&mut self) {
        let Some((&t, _)) = self.time_index.iter().next() else {
            return;
        };
        if let Some(keys) = self.time_index.get_mut(&t) {
            if let Some(key) = keys.pop() {
                self.entries.remove(&key);
            }
            if keys.is_empty() {
                self.time_index.remove(&t);
            }
        }
    }

    fn unindex(&mut self, key: &ElectionKey, first_seen: Timestamp) {
        let t = first_seen.as_millis();
        if let Some(keys) = self.time_index.get_mut(&t) {
            keys.retain(|k| k != key);
            if keys.is_empty() {
                self.time_index.remove(&t);
            }
        }
    }
}

impl Default for PendingMessages {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_KEYS, DEFAULT_TTL_MS)
    }
}
