//! Nullable infrastructure for deterministic testing.
//!
//! The election service reads time and moves bytes through narrow seams.
//! This crate provides stand-ins for both that:
//! - advance only when the test says so
//! - record what was sent so tests can assert on it
//! - never touch the network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod clock;
pub mod network;

pub use clock::NullClock;
pub use network::NullNetwork;
