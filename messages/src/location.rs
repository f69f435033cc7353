//! Election locations: which faulting slot an election is about, and which
//! attempt (round) a message belongs to.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::codec::{CodecError, Reader, Writer};

/// Identifies one election: the faulting leader-slot at a height and minute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElectionKey {
    pub height: u32,
    pub minute: u8,
    pub slot: u32,
}

/// How a message's key relates to the key of the election inspecting it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyOrder {
    /// Earlier height or minute.
    Past,
    Current,
    /// Later height or minute.
    Future,
    /// Same height and minute, different slot: another election entirely.
    OtherSlot,
}

impl ElectionKey {
    pub fn new(height: u32, minute: u8, slot: u32) -> Self {
        Self {
            height,
            minute,
            slot,
        }
    }

    /// Position of `self` relative to `current`.
    pub fn compare_to(&self, current: &ElectionKey) -> KeyOrder {
        match (self.height, self.minute).cmp(&(current.height, current.minute)) {
            Ordering::Less => KeyOrder::Past,
            Ordering::Greater => KeyOrder::Future,
            Ordering::Equal if self.slot == current.slot => KeyOrder::Current,
            Ordering::Equal => KeyOrder::OtherSlot,
        }
    }

    pub fn at_round(&self, round: u32) -> ElectionLocation {
        ElectionLocation {
            height: self.height,
            minute: self.minute,
            slot: self.slot,
            round,
        }
    }
}

impl fmt::Display for ElectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}/m{}/s{}", self.height, self.minute, self.slot)
    }
}

/// `(height, minute, slot, round)`: one attempt of one election.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElectionLocation {
    pub height: u32,
    pub minute: u8,
    pub slot: u32,
    pub round: u32,
}

impl ElectionLocation {
    pub fn new(height: u32, minute: u8, slot: u32, round: u32) -> Self {
        Self {
            height,
            minute,
            slot,
            round,
        }
    }

    pub fn key(&self) -> ElectionKey {
        ElectionKey::new(self.height, self.minute, self.slot)
    }

    pub fn with_round(&self, round: u32) -> Self {
        Self { round, ..*self }
    }

    pub(crate) fn write(&self, w: &mut Writer) {
        w.put_u32(self.height);
        w.put_u8(self.minute);
        w.put_u32(self.slot);
        w.put_u32(self.round);
    }

    pub(crate) fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            height: r.u32()?,
            minute: r.u8()?,
            slot: r.u32()?,
            round: r.u32()?,
        })
    }
}

impl fmt::Display for ElectionLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/r{}", self.key(), self.round)
    }
}
