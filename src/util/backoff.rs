//! Spin, then yield, then sleep: the wait strategy used by [`SpinLock`](super::SpinLock)
//! and by idle workers.

use std::hint::spin_loop;
use std::thread;
use std::time::Duration;

/// Exponential backoff for a single contended acquisition.
#[derive(Debug)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6;
    const YIELD_LIMIT: u32 = 10;

    /// Create a new backoff instance
    pub fn new() -> Self {
        Self { step: 0 }
    }

    /// Perform one step of backoff. Past the yield phase every step sleeps
    /// for `throttle`.
    pub fn snooze(&mut self, throttle: Duration) {
        if self.step <= Self::SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                spin_loop();
            }
        } else if self.step <= Self::YIELD_LIMIT {
            thread::yield_now();
        } else {
            throttle_thread(throttle);
        }

        if self.step <= Self::YIELD_LIMIT {
            self.step += 1;
        }
    }

    /// Check if we've reached the sleep phase
    pub fn is_completed(&self) -> bool {
        self.step > Self::YIELD_LIMIT
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Pause the current thread for `duration`; a zero duration only yields.
pub fn throttle_thread(duration: Duration) {
    if duration.is_zero() {
        thread::yield_now();
    } else {
        thread::sleep(duration);
    }
}
