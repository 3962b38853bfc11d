//! Epoch-millisecond clock helpers.
//!
//! The pipeline stamps everything in epoch millis (`u64`). Store operations
//! that depend on the clock take an explicit `now_ms` argument so tests can
//! drive time deterministically; the services call [`now_ms`] at the edges.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as epoch milliseconds.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_is_recent() {
        // Anything after 2020-01-01 counts as a sane clock.
        assert!(now_ms() > 1_577_836_800_000);
    }
}
