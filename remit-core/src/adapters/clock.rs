//! Clock implementations

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use crate::ports::Clock;

/// Wall clock backed by `Instant::now` and `thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Virtual clock for tests.
///
/// `sleep` returns immediately, advances the virtual time and records the
/// requested duration.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Move virtual time forward without recording a sleep
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.elapsed += duration;
    }

    /// Every duration passed to `sleep`, in call order
    pub fn sleeps(&self) -> Vec<Duration> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.sleeps.clone()
    }

    /// Virtual time elapsed since creation
    pub fn elapsed(&self) -> Duration {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.elapsed
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.elapsed += duration;
        state.sleeps.push(duration);
    }
}
