//! Per-election candidate ordering.
//!
//! The order is unpredictable until `(height, minute, slot, round)` is known,
//! yet any node can re-derive and verify it afterwards. Position 0 is the
//! candidate expected to volunteer in that round.

use fedvote_messages::ElectionLocation;
use fedvote_types::Identity;

/// SHA-256 of the big-endian location fields.
pub fn ordering_mask(location: &ElectionLocation) -> [u8; 32] {
    fedvote_crypto::sha256_multi(&[
        &location.height.to_be_bytes(),
        &[location.minute],
        &location.slot.to_be_bytes(),
        &location.round.to_be_bytes(),
    ])
}

/// Mask every candidate, sort descending, unmask.
pub fn priority_order(candidates: &[Identity], location: &ElectionLocation) -> Vec<Identity> {
    let mask = ordering_mask(location);
    let mut masked: Vec<Identity> = candidates.iter().map(|c| c.masked(&mask)).collect();
    masked.sort_unstable_by(|a, b| b.cmp(a));
    masked.into_iter().map(|m| m.masked(&mask)).collect()
}

/// The candidate expected to volunteer at `location`.
pub fn expected_volunteer(candidates: &[Identity], location: &ElectionLocation) -> Option<Identity> {
    priority_order(candidates, location).first().copied()
}
