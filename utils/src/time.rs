//! Time formatting helpers.

use fedvote_types::Timestamp;

/// Format a duration in milliseconds to a human-readable string.
pub fn format_millis(ms: u64) -> String {
    if ms < 1_000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{}.{:03}s", ms / 1_000, ms % 1_000)
    } else if ms < 3_600_000 {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1_000)
    } else {
        format!("{}h {}m", ms / 3_600_000, (ms % 3_600_000) / 60_000)
    }
}

/// Time from `since` to `now`, formatted.
pub fn format_elapsed(since: Timestamp, now: Timestamp) -> String {
    format_millis(since.elapsed_since(now))
}
