//! Nullable network: record broadcasts without sending them.

use std::cell::RefCell;
use std::collections::VecDeque;

use fedvote_types::Identity;

/// A test network that records broadcasts instead of sending them.
///
/// Each broadcast is kept with its sender so a test can route it to every
/// other node, drop it, or deliver it twice.
pub struct NullNetwork {
    sent: RefCell<Vec<(Identity, Vec<u8>)>>,
    inbox: RefCell<VecDeque<Vec<u8>>>,
}

impl NullNetwork {
    pub fn new() -> Self {
        Self {
            sent: RefCell::new(Vec::new()),
            inbox: RefCell::new(VecDeque::new()),
        }
    }

    pub fn broadcast(&self, from: Identity, message: Vec<u8>) {
        self.sent.borrow_mut().push((from, message));
    }

    /// Enqueue a message for the node to receive.
    pub fn enqueue(&self, message: Vec<u8>) {
        self.inbox.borrow_mut().push_back(message);
    }

    pub fn receive(&self) -> Option<Vec<u8>> {
        self.inbox.borrow_mut().pop_front()
    }

    /// Everything broadcast so far (for assertions).
    pub fn sent(&self) -> Vec<(Identity, Vec<u8>)> {
        self.sent.borrow().clone()
    }

    /// Remove and return everything broadcast since the last call.
    pub fn take_sent(&self) -> Vec<(Identity, Vec<u8>)> {
        std::mem::take(&mut *self.sent.borrow_mut())
    }

    pub fn reset(&self) {
        self.sent.borrow_mut().clear();
        self.inbox.borrow_mut().clear();
    }
}

impl Default for NullNetwork {
    fn default() -> Self {
        Self::new()
    }
}
