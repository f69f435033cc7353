//! Election membership: the live roster supplied by the node and the
//! per-election [`AuthSet`] snapshot derived from it.

use std::collections::HashMap;

use fedvote_messages::{ElectionKey, ElectionLocation};
use fedvote_types::Identity;
use serde::{Deserialize, Serialize};

use crate::error::ElectionError;
use crate::priority::priority_order;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Leader,
    Candidate,
}

/// Ordered membership of one election.
///
/// Each identity appears once. Candidates get a priority index equal to their
/// reverse insertion order (the last candidate added has priority 0), and the
/// indices always form a dense permutation of `0..candidates`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthSet {
    members: Vec<(Identity, Role)>,
    roles: HashMap<Identity, (Role, usize)>,
    leaders: Vec<Identity>,
    candidates: Vec<Identity>,
    priority: HashMap<Identity, u32>,
}

impl AuthSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot for one election: leaders in live order, then candidates in
    /// reverse round-0 priority order, so a candidate's priority index equals
    /// its position in [`priority_order`] for the election's first round.
    pub fn for_election(
        live: &ElectionRoster,
        location: &ElectionLocation,
    ) -> Result<Self, ElectionError> {
        if live.leaders.is_empty() {
            return Err(ElectionError::NoLeaders);
        }
        let mut set = Self::new();
        for leader in &live.leaders {
            set.add(*leader, Role::Leader)?;
        }
        let ordered = priority_order(&live.candidates, &location.with_round(0));
        for candidate in ordered.iter().rev() {
            set.add(*candidate, Role::Candidate)?;
        }
        Ok(set)
    }

    /// Append a member. Returns its index within its role.
    pub fn add(&mut self, id: Identity, role: Role) -> Result<usize, ElectionError> {
        if self.roles.contains_key(&id) {
            return Err(ElectionError::DuplicateIdentity(id));
        }
        let list = match role {
            Role::Leader => &mut self.leaders,
            Role::Candidate => &mut self.candidates,
        };
        let index = list.len();
        list.push(id);
        self.members.push((id, role));
        self.roles.insert(id, (role, index));
        if role == Role::Candidate {
            let count = self.candidates.len();
            for (i, c) in self.candidates.iter().enumerate() {
                self.priority.insert(*c, (count - 1 - i) as u32);
            }
        }
        Ok(index)
    }

    pub fn role(&self, id: &Identity) -> Option<Role> {
        self.roles.get(id).map(|(role, _)| *role)
    }

    pub fn is_leader(&self, id: &Identity) -> bool {
        self.role(id) == Some(Role::Leader)
    }

    pub fn is_candidate(&self, id: &Identity) -> bool {
        self.role(id) == Some(Role::Candidate)
    }

    /// Index of `id` within its role's list.
    pub fn index_of(&self, id: &Identity) -> Option<usize> {
        self.roles.get(id).map(|(_, index)| *index)
    }

    pub fn volunteer_priority(&self, id: &Identity) -> Option<u32> {
        self.priority.get(id).copied()
    }

    pub fn candidate_with_priority(&self, priority: u32) -> Option<Identity> {
        let count = self.candidates.len() as u32;
        if priority >= count {
            return None;
        }
        self.candidates.get((count - 1 - priority) as usize).copied()
    }

    /// `⌊leaders / 2⌋ + 1`
    pub fn majority(&self) -> usize {
        self.leaders.len() / 2 + 1
    }

    pub fn leaders(&self) -> &[Identity] {
        &self.leaders
    }

    pub fn candidates(&self) -> &[Identity] {
        &self.candidates
    }

    pub fn members(&self) -> &[(Identity, Role)] {
        &self.members
    }
}

/// The node's live process-list membership, in process-list order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionRoster {
    pub leaders: Vec<Identity>,
    pub candidates: Vec<Identity>,
}

impl ElectionRoster {
    pub fn new(leaders: Vec<Identity>, candidates: Vec<Identity>) -> Self {
        Self {
            leaders,
            candidates,
        }
    }

    /// The leader responsible for `key.slot` at the key's height and minute.
    ///
    /// Slot assignments rotate by `height + minute`, so leader `i` serves
    /// slot `(i + height + minute) mod leaders`.
    pub fn leader_for_slot(&self, key: &ElectionKey) -> Option<Identity> {
        let n = self.leaders.len() as u64;
        if n == 0 {
            return None;
        }
        let offset = (key.height as u64 + key.minute as u64) % n;
        let idx = (key.slot as u64 % n + n - offset) % n;
        self.leaders.get(idx as usize).copied()
    }

    pub fn leader_index(&self, id: &Identity) -> Option<u32> {
        self.leaders.iter().position(|l| l == id).map(|i| i as u32)
    }

    pub fn candidate_index(&self, id: &Identity) -> Option<u32> {
        self.candidates.iter().position(|c| c == id).map(|i| i as u32)
    }

    /// Apply a committed replacement: the candidate takes the faulted
    /// leader's position and the faulted leader takes the candidate's.
    pub fn apply_swap(&mut self, swap: &RosterSwap) -> Result<(), ElectionError> {
        let fi = swap.faulted_index as usize;
        let ci = swap.candidate_index as usize;
        if self.leaders.get(fi) != Some(&swap.faulted) {
            return Err(ElectionError::SwapMismatch(format!(
                "leader {} is not {:?}",
                fi, swap.faulted
            )));
        }
        if self.candidates.get(ci) != Some(&swap.candidate) {
            return Err(ElectionError::SwapMismatch(format!(
                "candidate {} is not {:?}",
                ci, swap.candidate
            )));
        }
        std::mem::swap(&mut self.leaders[fi], &mut self.candidates[ci]);
        Ok(())
    }
}

/// Roster-mutation command produced once per committed election.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterSwap {
    pub key: ElectionKey,
    pub faulted: Identity,
    pub faulted_index: u32,
    pub candidate: Identity,
    pub candidate_index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(b: u8) -> Identity {
        Identity::new([b; 32])
    }

    #[test]
    fn priority_is_reverse_insertion_order() {
        let mut set = AuthSet::new();
        set.add(id(1), Role::Candidate).unwrap();
        set.add(id(2), Role::Candidate).unwrap();
        set.add(id(3), Role::Candidate).unwrap();
        assert_eq!(set.volunteer_priority(&id(1)), Some(2));
        assert_eq!(set.volunteer_priority(&id(2)), Some(1));
        assert_eq!(set.volunteer_priority(&id(3)), Some(0));
        assert_eq!(set.candidate_with_priority(0), Some(id(3)));
        assert_eq!(set.candidate_with_priority(3), None);
    }

    #[test]
    fn priorities_form_dense_permutation() {
        let mut set = AuthSet::new();
        for b in 10..17 {
            set.add(id(b), Role::Candidate).unwrap();
        }
        let mut prios: Vec<u32> = set
            .candidates()
            .iter()
            .filter_map(|c| set.volunteer_priority(c))
            .collect();
        prios.sort_unstable();
        assert_eq!(prios, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn duplicate_identity_rejected() {
        let mut set = AuthSet::new();
        set.add(id(1), Role::Leader).unwrap();
        assert_eq!(
            set.add(id(1), Role::Candidate),
            Err(ElectionError::DuplicateIdentity(id(1)))
        );
    }

    #[test]
    fn majority_threshold() {
        for (leaders, expected) in [(1, 1), (2, 2), (3, 2), (4, 3), (5, 3), (7, 4)] {
            let mut set = AuthSet::new();
            for b in 0..leaders {
                set.add(id(b), Role::Leader).unwrap();
            }
            assert_eq!(set.majority(), expected, "leaders = {}", leaders);
        }
    }

    #[test]
    fn leaders_have_no_priority() {
        let mut set = AuthSet::new();
        set.add(id(1), Role::Leader).unwrap();
        assert!(set.is_leader(&id(1)));
        assert_eq!(set.volunteer_priority(&id(1)), None);
    }

    #[test]
    fn for_election_puts_expected_volunteer_at_priority_zero() {
        let live = ElectionRoster::new(vec![id(1), id(2), id(3)], vec![id(7), id(8), id(9)]);
        let loc = ElectionLocation::new(50, 2, 1, 0);
        let set = AuthSet::for_election(&live, &loc).unwrap();
        let order = priority_order(&live.candidates, &loc);
        for (position, candidate) in order.iter().enumerate() {
            assert_eq!(set.volunteer_priority(candidate), Some(position as u32));
        }
        assert_eq!(set.leaders(), live.leaders.as_slice());
    }

    #[test]
    fn for_election_requires_leaders() {
        let live = ElectionRoster::new(vec![], vec![id(7)]);
        assert_eq!(
            AuthSet::for_election(&live, &ElectionLocation::new(1, 0, 0, 0)),
            Err(ElectionError::NoLeaders)
        );
    }

    #[test]
    fn slot_assignment_rotates_with_minute() {
        let live = ElectionRoster::new(vec![id(1), id(2), id(3)], vec![]);
        assert_eq!(live.leader_for_slot(&ElectionKey::new(0, 0, 0)), Some(id(1)));
        assert_eq!(live.leader_for_slot(&ElectionKey::new(0, 1, 1)), Some(id(1)));
        assert_eq!(live.leader_for_slot(&ElectionKey::new(0, 1, 0)), Some(id(3)));
        assert_eq!(live.leader_for_slot(&ElectionKey::new(0, 2, 0)), Some(id(2)));
    }

    #[test]
    fn apply_swap_exchanges_members() {
        let mut live = ElectionRoster::new(vec![id(1), id(2)], vec![id(7), id(8)]);
        let swap = RosterSwap {
            key: ElectionKey::new(1, 0, 0),
            faulted: id(2),
            faulted_index: 1,
            candidate: id(7),
            candidate_index: 0,
        };
        live.apply_swap(&swap).unwrap();
        assert_eq!(live.leaders, vec![id(1), id(7)]);
        assert_eq!(live.candidates, vec![id(2), id(8)]);
        assert!(matches!(live.apply_swap(&swap), Err(ElectionError::SwapMismatch(_))));
    }
}
