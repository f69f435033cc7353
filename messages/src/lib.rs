//! Election message algebra for fedvote.
//!
//! Four message kinds travel between participants of a fault-recovery
//! election:
//!
//! - [`VolunteerMessage`]: a candidate offers to replace the faulted leader.
//! - [`VoteMessage`]: a leader endorses a volunteer (rank 0).
//! - [`LevelMessage`]: a leader's ranked claim, justified by earlier votes or
//!   claims.
//! - [`FaultMessage`]: the timeout that moves an election to its next round.
//!
//! All four share one big-endian wire format (see [`codec`]), a content hash
//! over the signable prefix, and Ed25519 signatures through the
//! [`MessageSigner`] / [`SignatureVerifier`] seam.

pub mod codec;
pub mod fault;
pub mod level;
pub mod location;
pub mod message;
pub mod sign;
pub mod volunteer;
pub mod vote;

pub use codec::CodecError;
pub use fault::FaultMessage;
pub use level::{claim_order, Justification, LevelMessage};
pub use location::{ElectionKey, ElectionLocation, KeyOrder};
pub use message::{ElectionMessage, MessageKind, SignedPayload};
pub use sign::{Ed25519Verifier, KeyPairSigner, MessageSigner, SignatureVerifier};
pub use volunteer::VolunteerMessage;
pub use vote::VoteMessage;
