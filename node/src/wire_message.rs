//! Top-level wire envelope exchanged between fedvote nodes.
//!
//! Election messages travel in their own binary encoding inside
//! [`WireMessage::Election`]; the envelope itself is bincode.

use fedvote_messages::ElectionMessage;
use fedvote_types::Identity;
use serde::{Deserialize, Serialize};

use crate::NodeError;

/// Frames larger than this are refused before decoding.
pub const MAX_ENVELOPE_LEN: usize = 1 << 20;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    /// A marshalled [`ElectionMessage`].
    Election(Vec<u8>),
    /// Liveness ping carrying the sender and its view of the current minute.
    Keepalive(KeepaliveMsg),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepaliveMsg {
    pub node: Identity,
    pub height: u32,
    pub minute: u8,
}

impl WireMessage {
    pub fn election(msg: &ElectionMessage) -> Self {
        WireMessage::Election(msg.marshal())
    }

    pub fn encode(&self) -> Result<Vec<u8>, NodeError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NodeError> {
        if bytes.len() > MAX_ENVELOPE_LEN {
            return Err(NodeError::Wire(Box::new(bincode::ErrorKind::SizeLimit)));
        }
        Ok(bincode::deserialize(bytes)?)
    }

    /// Unmarshal the carried election message, if this is one.
    pub fn into_election(self) -> Result<Option<ElectionMessage>, NodeError> {
        match self {
            WireMessage::Election(bytes) => Ok(Some(ElectionMessage::unmarshal(&bytes)?)),
            WireMessage::Keepalive(_) => Ok(None),
        }
    }
}
