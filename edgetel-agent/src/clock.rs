//! Time sources for scheduling and pulse timing.

use std::time::{Duration, Instant};

/// Below this, [`MonotonicClock::delay`] spins instead of sleeping.
const SPIN_THRESHOLD: Duration = Duration::from_millis(1);

/// A monotonic time source.
pub trait Clock {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    /// Block the calling thread for `duration`.
    fn delay(&self, duration: Duration);
}

/// Production clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn delay(&self, duration: Duration) {
        if duration >= SPIN_THRESHOLD {
            std::thread::sleep(duration);
            return;
        }

        // Sleeping for microseconds overshoots by far too much on Linux.
        let start = Instant::now();
        while start.elapsed() < duration {
            std::hint::spin_loop();
        }
    }
}
