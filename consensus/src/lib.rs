//! Consensus: replacing a faulted leader with a candidate.
//!
//! When a leader fails to produce its message for a slot, the remaining
//! leaders run a short election to promote one candidate into its place:
//!
//! - The candidate first in the election's priority order volunteers.
//! - Leaders vote for it, then climb through ranked Level claims.
//! - A majority of claims for one candidate at one rank commits it.
//! - Round timeouts rotate the expected volunteer when progress stalls.
//!
//! ## Module overview
//!
//! - [`election`]: Pure election state machine (Idle → … → Committed).
//! - [`adapter`]: Signing, verification, deferral and the roster swap.
//! - [`active_elections`]: Container routing messages to running elections.
//! - [`roster`]: Live roster, per-election authority set and slot mapping.
//! - [`priority`]: Deterministic per-round candidate ordering.
//! - [`equivocation`]: Claim bookkeeping and double-claim detection.
//! - [`pending`]: Buffer for messages that precede their election.
//! - [`round_timer`]: Round deadlines.
//! - [`diagnostics`]: Claim history, loop and illegal-vote checks, vote grid.
//! - [`error`]: Election error types.

pub mod active_elections;
pub mod adapter;
pub mod diagnostics;
pub mod election;
pub mod equivocation;
pub mod error;
pub mod pending;
pub mod priority;
pub mod roster;
pub mod round_timer;

pub use active_elections::ActiveElections;
pub use adapter::{
    AdapterConfig, ElectionAdapter, SharedSigner, SharedVerifier, VolunteerPayload,
};
pub use diagnostics::{IllegalVote, LevelEntry, VoteHistory};
pub use election::{Draft, Election, ElectionPhase, LevelDraft, OwnClaim, Validity};
pub use equivocation::{ClaimBook, ClaimRecord, EquivocationProof};
pub use error::ElectionError;
pub use pending::PendingMessages;
pub use priority::{expected_volunteer, ordering_mask, priority_order};
pub use roster::{AuthSet, ElectionRoster, Role, RosterSwap};
pub use round_timer::RoundTimers;
