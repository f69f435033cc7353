use fedvote_messages::{CodecError, ElectionKey, ElectionLocation};
use fedvote_types::{Identity, MessageHash};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ElectionError {
    #[error("stale message for {location}, election is at {current}")]
    Stale {
        location: ElectionLocation,
        current: ElectionLocation,
    },

    #[error("message for {location} belongs to another slot")]
    OtherSlot { location: ElectionLocation },

    #[error("{0:?} is not a leader in this election")]
    NotALeader(Identity),

    #[error("{0:?} is not a candidate in this election")]
    NotACandidate(Identity),

    #[error("volunteer names faulted leader {named:?}, election is for {expected:?}")]
    WrongFaultedLeader { named: Identity, expected: Identity },

    #[error("volunteer {field} index {got} does not match roster index {expected}")]
    IndexMismatch {
        field: &'static str,
        expected: u32,
        got: u32,
    },

    #[error("claim carries priority {got}, candidate has priority {expected}")]
    PriorityMismatch { expected: u32, got: u32 },

    #[error("invalid justification: {0}")]
    InvalidJustification(String),

    #[error("equivocation by {leader:?}: two different claims at {what} {value}")]
    Equivocation {
        leader: Identity,
        what: &'static str,
        value: u32,
    },

    #[error("fault event signed by {0:?}, neither this node nor a leader")]
    ForeignFault(Identity),

    #[error("invalid signature from {0:?}")]
    InvalidSignature(Identity),

    #[error("duplicate identity {0:?} in roster")]
    DuplicateIdentity(Identity),

    #[error("roster has no leaders")]
    NoLeaders,

    #[error("swap does not match roster: {0}")]
    SwapMismatch(String),

    #[error("justification reference {0:?} is not cached")]
    UnresolvedReference(MessageHash),

    #[error("election capacity reached: {0}")]
    CapacityReached(usize),

    #[error("no active election for {0}")]
    ElectionNotFound(ElectionKey),

    #[error("malformed message: {0}")]
    Malformed(#[from] CodecError),
}
