//! Clock port - time source and sleeper for the retry loop

use std::time::{Duration, Instant};

/// Source of time for backoff and deadlines.
///
/// Injected so retry behaviour can be tested without real elapsed time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Block the current caller for `duration`
    fn sleep(&self, duration: Duration);
}
