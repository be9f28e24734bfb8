// worker thread loop
use super::ActiveFlag;
use crate::queue::TaskQueue;
use crate::util::throttle_thread;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

pub type WorkerId = usize;

// wake-up stagger repeats every 128 workers
const STAGGER_PERIOD: usize = 128;

pub(crate) struct Worker {
    pub id: WorkerId,
    queue: Arc<TaskQueue>,
    active: ActiveFlag,
    pause: Duration,
}

impl Worker {
    pub fn new(id: WorkerId, queue: Arc<TaskQueue>, active: ActiveFlag, throttle: Duration) -> Self {
        Self {
            id,
            queue,
            active,
            pause: pause_for(id, throttle),
        }
    }

    // main loop: always drains at least once, exits after the first full
    // pass that ends with the flag cleared
    pub fn run(self) {
        loop {
            throttle_thread(self.pause);
            self.queue.perform();

            if !self.active.load(Ordering::Acquire) {
                break;
            }
        }
        trace!(worker = self.id, "worker exiting");
    }
}

/// Pause between drain passes for worker `id`.
pub(crate) fn pause_for(id: WorkerId, throttle: Duration) -> Duration {
    throttle.saturating_mul((id % STAGGER_PERIOD) as u32)
}
