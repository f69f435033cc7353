//! Nullable clock: deterministic millisecond time for testing.

use fedvote_types::Timestamp;
use std::cell::Cell;

/// A deterministic clock for testing.
///
/// Time only advances when you tell it to.
pub struct NullClock {
    current: Cell<u64>,
}

impl NullClock {
    pub fn new(initial_ms: u64) -> Self {
        Self {
            current: Cell::new(initial_ms),
        }
    }

    pub fn now(&self) -> Timestamp {
        Timestamp::new(self.current.get())
    }

    /// Advance time by `ms` milliseconds and return the new time.
    pub fn advance(&self, ms: u64) -> Timestamp {
        self.current.set(self.current.get() + ms);
        self.now()
    }

    pub fn set(&self, ms: u64) {
        self.current.set(ms);
    }
}

impl Default for NullClock {
    fn default() -> Self {
        Self::new(1_000_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_only_on_request() {
        let clock = NullClock::new(10);
        assert_eq!(clock.now(), Timestamp::new(10));
        assert_eq!(clock.advance(5), Timestamp::new(15));
        clock.set(3);
        assert_eq!(clock.now().as_millis(), 3);
    }
}
