//! Fixed-window rate limiter for in-flight admissions.
//!
//! Each category admits at most `ceiling` jobs to in-flight per one-second
//! window; the next admission in a full window is deferred to the window
//! boundary rather than rejected.

/// Window length. The provider quota this protects is specified per second.
const WINDOW_MS: u64 = 1000;

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Granted,
    /// Window full; try again at `retry_at_ms`.
    Deferred { retry_at_ms: u64 },
}

/// Fixed-window counter. The window anchors at the first admission after a
/// boundary, matching how the provider meters send quotas.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    ceiling: u32,
    window_start_ms: u64,
    admitted: u32,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new(ceiling: u32) -> Self {
        Self {
            ceiling: ceiling.max(1),
            window_start_ms: 0,
            admitted: 0,
        }
    }

    /// Try to admit one job at `now_ms`.
    pub fn try_admit(&mut self, now_ms: u64) -> Admission {
        if now_ms >= self.window_start_ms + WINDOW_MS {
            self.window_start_ms = now_ms;
            self.admitted = 0;
        }

        if self.admitted < self.ceiling {
            self.admitted += 1;
            Admission::Granted
        } else {
            Admission::Deferred {
                retry_at_ms: self.window_start_ms + WINDOW_MS,
            }
        }
    }

    /// Return an unused admission (the grant found no due job to claim).
    pub fn refund(&mut self) {
        self.admitted = self.admitted.saturating_sub(1);
    }
}
