//! Claim bookkeeping and equivocation detection.
//!
//! A leader may issue at most one Level claim per rank, and each of its claims
//! carries a distinct level sequence number. A second, different claim at the
//! same `(leader, rank)` for another candidate, or at the same
//! `(leader, level)` with a different rank or candidate, is equivocation. The
//! offending claim is rejected and a proof is kept so the node can report it.
//!
//! Because one leader contributes at most one claim per rank, two majorities
//! at the same rank always share an honest leader and therefore a candidate.

use std::collections::{BTreeMap, HashMap};

use fedvote_types::{Identity, MessageHash};

/// One leader's claim, as far as tallying is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimRecord {
    pub hash: MessageHash,
    pub leader: Identity,
    pub candidate: Identity,
    pub rank: u32,
    pub level: u32,
    pub priority: u32,
    pub committed: bool,
}

/// Evidence that a leader signed two incompatible claims.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EquivocationProof {
    pub leader: Identity,
    /// The claim recorded first.
    pub first: MessageHash,
    /// The conflicting claim.
    pub second: MessageHash,
    pub rank: u32,
    pub level: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClaimBook {
    /// rank → leader → claim
    by_rank: BTreeMap<u32, BTreeMap<Identity, ClaimRecord>>,
    /// (leader, level) → (rank, candidate, hash)
    by_level: HashMap<(Identity, u32), (u32, Identity, MessageHash)>,
    proofs: Vec<EquivocationProof>,
}

impl ClaimBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a batch of claims against the book and against each other
    /// without recording anything.
    pub fn check_batch(&self, records: &[ClaimRecord]) -> Result<(), EquivocationProof> {
        let mut ranks: HashMap<(Identity, u32), (Identity, MessageHash)> = HashMap::new();
        let mut levels: HashMap<(Identity, u32), (u32, Identity, MessageHash)> = HashMap::new();
        for record in records {
            self.check(record)?;
            let rank_key = (record.leader, record.rank);
            if let Some((candidate, hash)) = ranks.get(&rank_key) {
                if *candidate != record.candidate {
                    return Err(proof(record, *hash));
                }
            }
            let level_key = (record.leader, record.level);
            if let Some((rank, candidate, hash)) = levels.get(&level_key) {
                if *hash != record.hash && (*rank != record.rank || *candidate != record.candidate) {
                    return Err(proof(record, *hash));
                }
            }
            ranks.insert(rank_key, (record.candidate, record.hash));
            levels.insert(level_key, (record.rank, record.candidate, record.hash));
        }
        Ok(())
    }

    /// Check one claim against the book.
    pub fn check(&self, record: &ClaimRecord) -> Result<(), EquivocationProof> {
        if let Some(existing) = self
            .by_rank
            .get(&record.rank)
            .and_then(|leaders| leaders.get(&record.leader))
        {
            if existing.candidate != record.candidate {
                return Err(proof(record, existing.hash));
            }
        }
        if let Some((rank, candidate, hash)) = self.by_level.get(&(record.leader, record.level)) {
            if *hash != record.hash && (*rank != record.rank || *candidate != record.candidate) {
                return Err(proof(record, *hash));
            }
        }
        Ok(())
    }

    /// Record a claim. `Ok(true)` when it was new; `Ok(false)` when the
    /// leader already has an equivalent claim at that rank.
    pub fn insert(&mut self, record: ClaimRecord) -> Result<bool, EquivocationProof> {
        if let Err(proof) = self.check(&record) {
            self.proofs.push(proof.clone());
            return Err(proof);
        }
        let leaders = self.by_rank.entry(record.rank).or_default();
        if leaders.contains_key(&record.leader) {
            return Ok(false);
        }
        leaders.insert(record.leader, record);
        self.by_level.insert(
            (record.leader, record.level),
            (record.rank, record.candidate, record.hash),
        );
        Ok(true)
    }

    pub fn note_proof(&mut self, proof: EquivocationProof) {
        self.proofs.push(proof);
    }

    /// Claims at `rank`, ordered by leader identity.
    pub fn at_rank(&self, rank: u32) -> Vec<ClaimRecord> {
        self.by_rank
            .get(&rank)
            .map(|leaders| leaders.values().copied().collect())
            .unwrap_or_default()
    }

    /// Ranks with at least one claim, highest first.
    pub fn ranks_desc(&self) -> Vec<u32> {
        self.by_rank.keys().rev().copied().collect()
    }

    pub fn highest_rank(&self) -> Option<u32> {
        self.by_rank.keys().next_back().copied()
    }

    /// The highest rank at which one candidate holds `majority` claims,
    /// with those claims in leader order.
    pub fn highest_majority(&self, majority: usize) -> Option<(u32, Identity, Vec<ClaimRecord>)> {
        for (rank, leaders) in self.by_rank.iter().rev() {
            let mut tally: BTreeMap<Identity, Vec<ClaimRecord>> = BTreeMap::new();
            for record in leaders.values() {
                tally.entry(record.candidate).or_default().push(*record);
            }
            if let Some((candidate, records)) =
                tally.into_iter().find(|(_, records)| records.len() >= majority)
            {
                return Some((*rank, candidate, records));
            }
        }
        None
    }

    pub fn proofs(&self) -> &[EquivocationProof] {
        &self.proofs
    }

    pub fn len(&self) -> usize {
        self.by_rank.values().map(|leaders| leaders.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_rank.is_empty()
    }
}

/// True when no candidate can still reach `majority` claims at this rank:
/// for every candidate, its claims plus the leaders not yet heard from stay
/// below the threshold, and the unheard leaders alone cannot form one either.
pub fn majority_impossible(claims: &[ClaimRecord], leaders: usize, majority: usize) -> bool {
    let unseen = leaders.saturating_sub(claims.len());
    if unseen >= majority {
        return false;
    }
    let mut tally: HashMap<Identity, usize> = HashMap::new();
    for claim in claims {
        *tally.entry(claim.candidate).or_default() += 1;
    }
    tally.values().all(|count| count + unseen < majority)
}

/// The claim whose candidate has the best (smallest) volunteer priority.
pub fn best_priority(claims: &[ClaimRecord]) -> Option<&ClaimRecord> {
    claims.iter().min_by_key(|c| (c.priority, c.candidate))
}

fn proof(record: &ClaimRecord, first: MessageHash) -> EquivocationProof {
    EquivocationProof {
        leader: record.leader,
        first,
        second: record.hash,
        rank: record.rank,
        level: record.level,
    }
}
