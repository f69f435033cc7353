//! Pre-built [`tracing::Span`] constructors for the election service.
//!
//! Consistent span names and fields keep per-election traces easy to filter.

use fedvote_messages::{ElectionKey, MessageKind};
use fedvote_types::Identity;
use tracing::{debug_span, info_span, Span};

/// Span covering the lifetime of one election's handling on this node.
pub fn election_span(key: &ElectionKey) -> Span {
    info_span!("election", key = %key)
}

/// Span covering the execution of one inbound election message.
pub fn execute_span(key: &ElectionKey, kind: MessageKind, signer: &Identity) -> Span {
    debug_span!("execute", key = %key, kind = %kind, signer = %signer.short())
}

/// Span covering the broadcast of a message produced by this node.
pub fn broadcast_span(kind: MessageKind, round: u32) -> Span {
    debug_span!("broadcast", kind = %kind, round = round)
}

/// Span covering the application of a committed roster swap.
pub fn roster_swap_span(key: &ElectionKey, faulted_index: u32, candidate_index: u32) -> Span {
    info_span!(
        "roster_swap",
        key = %key,
        faulted_index = faulted_index,
        candidate_index = candidate_index
    )
}
