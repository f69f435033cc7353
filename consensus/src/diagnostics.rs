//! Per-leader claim history, loop detection, illegal-vote checks and the
//! text grid used by the simulator and debug logs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;

use fedvote_types::Identity;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelEntry {
    pub level: u32,
    pub rank: u32,
    pub candidate: Identity,
    pub priority: u32,
    pub committed: bool,
    pub eom_from: Option<Identity>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IllegalVote {
    #[error("{leader:?} lowered its rank from {from} to {to} at level {level}")]
    RankDecreased {
        leader: Identity,
        level: u32,
        from: u32,
        to: u32,
    },
    #[error("{leader:?} changed priority from {from} to {to} at rank {rank}, level {level}")]
    PriorityChanged {
        leader: Identity,
        level: u32,
        rank: u32,
        from: u32,
        to: u32,
    },
}

/// Claim and vote history of every leader in one election.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VoteHistory {
    columns: Vec<Identity>,
    levels: HashMap<Identity, BTreeMap<u32, LevelEntry>>,
    votes: HashMap<Identity, BTreeSet<u32>>,
}

impl VoteHistory {
    /// `columns` fixes the grid's column order.
    pub fn new(columns: Vec<Identity>) -> Self {
        Self {
            columns,
            levels: HashMap::new(),
            votes: HashMap::new(),
        }
    }

    pub fn record_level(&mut self, leader: Identity, entry: LevelEntry) {
        self.levels
            .entry(leader)
            .or_default()
            .entry(entry.level)
            .or_insert(entry);
    }

    /// Record a vote for the candidate with `priority`.
    pub fn record_vote(&mut self, leader: Identity, priority: u32) {
        self.votes.entry(leader).or_default().insert(priority);
    }

    /// The leader's claims in level order.
    pub fn entries(&self, leader: &Identity) -> Vec<LevelEntry> {
        self.levels
            .get(leader)
            .map(|levels| levels.values().copied().collect())
            .unwrap_or_default()
    }

    /// True when the leader's last three claims each switched candidate while
    /// climbing exactly one rank: the signature of two candidates
    /// leapfrogging each other without converging.
    pub fn detect_vertical_loop(&self, leader: &Identity) -> bool {
        let entries = self.entries(leader);
        if entries.len() < 3 {
            return false;
        }
        let tail = &entries[entries.len() - 3..];
        tail.windows(2)
            .filter(|w| w[1].candidate != w[0].candidate && w[1].rank == w[0].rank + 1)
            .count()
            >= 2
    }

    /// Ranks never go down across a leader's levels, and at an unchanged rank
    /// the priority never changes.
    pub fn detect_illegal_vote(&self, leader: &Identity) -> Result<(), IllegalVote> {
        let entries = self.entries(leader);
        for w in entries.windows(2) {
            let (prev, next) = (w[0], w[1]);
            if next.rank < prev.rank {
                return Err(IllegalVote::RankDecreased {
                    leader: *leader,
                    level: next.level,
                    from: prev.rank,
                    to: next.rank,
                });
            }
            if next.rank == prev.rank && next.priority != prev.priority {
                return Err(IllegalVote::PriorityChanged {
                    leader: *leader,
                    level: next.level,
                    rank: next.rank,
                    from: prev.priority,
                    to: next.priority,
                });
            }
        }
        Ok(())
    }

    /// Grid of leaders (columns) by level (rows).
    ///
    /// The `V` row lists the priorities each leader voted for. Claim cells read
    /// `rank.priority`; committed claims read `S-EOM{p}` when the leader
    /// anchored the commit itself and `{col}-EOM{p}` when it followed the
    /// leader in column `col`.
    pub fn render(&self) -> String {
        let max_level = self
            .levels
            .values()
            .filter_map(|levels| levels.keys().next_back().copied())
            .max()
            .unwrap_or(0);

        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut header = vec!["Lvl".to_string()];
        header.extend((0..self.columns.len()).map(|i| format!("L{}", i)));
        rows.push(header);

        let mut vote_row = vec!["V".to_string()];
        for leader in &self.columns {
            let cell = self
                .votes
                .get(leader)
                .map(|p| p.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(","))
                .unwrap_or_else(|| "-".to_string());
            vote_row.push(cell);
        }
        rows.push(vote_row);

        for level in 1..=max_level {
            let mut row = vec![level.to_string()];
            for leader in &self.columns {
                let cell = self
                    .levels
                    .get(leader)
                    .and_then(|levels| levels.get(&level))
                    .map(|entry| self.cell(leader, entry))
                    .unwrap_or_else(|| ".".to_string());
                row.push(cell);
            }
            rows.push(row);
        }

        let width = rows
            .iter()
            .flat_map(|r| r.iter().map(|c| c.len()))
            .max()
            .unwrap_or(0)
            + 1;
        let mut out = String::new();
        for row in rows {
            let line: String = row.iter().map(|c| format!("{:<width$}", c, width = width)).collect();
            let _ = writeln!(out, "{}", line.trim_end());
        }
        out
    }

    fn cell(&self, leader: &Identity, entry: &LevelEntry) -> String {
        if !entry.committed {
            return format!("{}.{}", entry.rank, entry.priority);
        }
        match entry.eom_from {
            Some(from) if from != *leader => {
                match self.columns.iter().position(|c| *c == from) {
                    Some(col) => format!("{}-EOM{}", col, entry.priority),
                    None => format!("?-EOM{}", entry.priority),
                }
            }
            _ => format!("S-EOM{}", entry.priority),
        }
    }
}
