//! Shared utilities for the fedvote election protocol.

pub mod stats;
pub mod time;

pub use stats::StatsCounter;
pub use time::{format_elapsed, format_millis};
