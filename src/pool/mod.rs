//! Fixed-size worker pool draining one [`TaskQueue`].
//!
//! Workers loop over `perform()` until the pool's active flag is cleared.
//! Shutdown is cooperative: [`ThreadPool::stop`] only flips the flag, and a
//! worker notices it after finishing its current drain pass.

pub mod spawner;
pub(crate) mod worker;

pub use spawner::{Spawner, ThreadSpawner, WorkerBody};
pub use worker::WorkerId;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::queue::TaskQueue;
use crate::runtime;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};
use worker::Worker;

/// Where a pool keeps its active flag. Supervised pools use a process-wide
/// static so signal handlers can reach it without chasing a pointer.
#[derive(Debug, Clone)]
pub(crate) enum ActiveFlag {
    Shared(Arc<AtomicBool>),
    Static(&'static AtomicBool),
}

impl ActiveFlag {
    fn fresh() -> Self {
        ActiveFlag::Shared(Arc::new(AtomicBool::new(true)))
    }
}

impl Deref for ActiveFlag {
    type Target = AtomicBool;

    fn deref(&self) -> &AtomicBool {
        match self {
            ActiveFlag::Shared(flag) => flag,
            ActiveFlag::Static(flag) => flag,
        }
    }
}

#[derive(Debug)]
struct WorkerHandle {
    id: WorkerId,
    thread: Option<JoinHandle<()>>,
}

#[derive(Debug)]
pub struct ThreadPool {
    workers: Vec<WorkerHandle>,
    queue: Arc<TaskQueue>,
    active: ActiveFlag,
    num_threads: usize,
}

impl ThreadPool {
    /// Start `thread_count` workers on the process-wide queue.
    pub fn start(thread_count: usize) -> Result<Self> {
        let config = Config::default().with_num_threads(thread_count);
        Self::with_queue(runtime::global().clone(), &config)
    }

    pub fn with_queue(queue: Arc<TaskQueue>, config: &Config) -> Result<Self> {
        Self::with_spawner(queue, config, &ThreadSpawner::from_config(config))
    }

    pub fn with_spawner<S>(queue: Arc<TaskQueue>, config: &Config, spawner: &S) -> Result<Self>
    where
        S: Spawner + ?Sized,
    {
        Self::launch(queue, config, spawner, ActiveFlag::fresh())
    }

    /// Spawn workers one at a time. The flag must already be set; it is
    /// cleared again if a spawn fails.
    pub(crate) fn launch<S>(
        queue: Arc<TaskQueue>,
        config: &Config,
        spawner: &S,
        active: ActiveFlag,
    ) -> Result<Self>
    where
        S: Spawner + ?Sized,
    {
        if config.num_threads == Some(0) {
            active.store(false, Ordering::Release);
            return Err(Error::invalid_argument("thread_count must be > 0"));
        }
        if let Err(e) = config.validate() {
            active.store(false, Ordering::Release);
            return Err(e);
        }

        let num_threads = config.worker_threads();
        let mut pool = Self {
            workers: Vec::with_capacity(num_threads),
            queue,
            active,
            num_threads,
        };

        for id in 0..num_threads {
            let worker = Worker::new(id, pool.queue.clone(), pool.active.clone(), config.throttle);

            match spawner.spawn(id, Box::new(move || worker.run())) {
                Ok(thread) => pool.workers.push(WorkerHandle {
                    id,
                    thread: Some(thread),
                }),
                Err(e) => {
                    warn!(
                        worker = id,
                        requested = num_threads,
                        error = %e,
                        "worker spawn failed, unwinding pool"
                    );
                    pool.stop();
                    pool.join_all();
                    return Err(Error::Spawn(e));
                }
            }
        }

        // lock contention grows with the number of drainers
        pool.queue
            .set_lock_throttle(config.throttle.saturating_mul(num_threads as u32));

        debug!(threads = num_threads, "thread pool started");
        Ok(pool)
    }

    /// Ask workers to exit after their current drain pass.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Block until every worker has exited, then release the pool.
    pub fn wait(mut self) {
        self.join_all();
        debug!(threads = self.num_threads, "thread pool finished");
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    // reverse start order
    fn join_all(&mut self) {
        while let Some(mut worker) = self.workers.pop() {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    warn!(worker = worker.id, "worker thread terminated by a panicking task");
                }
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.stop();
            self.join_all();
        }
    }
}
