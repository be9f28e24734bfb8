//! Multi-process fan-out of a worker pool.
//!
//! [`Supervisor::perform_in_fork`] forks `process_count - 1` children. Every
//! process, parent included, then runs its own [`ThreadPool`] over its own
//! copy of the queue until the pool is stopped by SIGINT, SIGTERM or
//! [`stop_fork`].
//!
//! Tasks queued before the fork exist in every copy of the queue and run
//! once per process: `j` queued tasks across `p` processes execute `p * j`
//! times. Queue work after the fork, from inside a task, when it must run in
//! one process only.

mod slot;

#[cfg(unix)]
mod signals;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::pool::{ThreadPool, ThreadSpawner};
use crate::queue::TaskQueue;
use crate::runtime;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info};

// one supervised run per process: the active-pool slot is process-wide
static RUN_GUARD: Mutex<()> = Mutex::new(());

/// Which side of the fork returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkRole {
    /// The original process; its pool and every child have finished.
    Parent,
    /// A forked child whose work is done. The caller must exit the process.
    Child,
}

/// Numeric form of a supervised run's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkStatus {
    ParentSuccess,
    ChildRunning,
    SetupError,
}

impl ForkStatus {
    /// 0 for the parent, a positive value for a child, -1 on setup failure.
    pub fn code(self) -> i32 {
        match self {
            ForkStatus::ParentSuccess => 0,
            ForkStatus::ChildRunning => 1,
            ForkStatus::SetupError => -1,
        }
    }
}

impl From<&Result<ForkRole>> for ForkStatus {
    fn from(result: &Result<ForkRole>) -> Self {
        match result {
            Ok(ForkRole::Parent) => ForkStatus::ParentSuccess,
            Ok(ForkRole::Child) => ForkStatus::ChildRunning,
            Err(_) => ForkStatus::SetupError,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Supervisor {
    queue: Arc<TaskQueue>,
    config: Config,
}

impl Supervisor {
    pub fn new(queue: Arc<TaskQueue>, config: Config) -> Self {
        Self { queue, config }
    }

    /// Run the queue on `thread_count` workers in each of `process_count`
    /// processes (`0` is treated as `1`). Returns once this process's pool
    /// has been stopped and drained.
    ///
    /// If the parent's own pool cannot start, its children are still stopped
    /// and reaped and the start error is returned; queued tasks stay queued
    /// in the parent.
    #[cfg(unix)]
    pub fn perform_in_fork(&self, process_count: usize, thread_count: usize) -> Result<ForkRole> {
        let _guard = RUN_GUARD.try_lock().ok_or(Error::AlreadyRunning)?;

        let saved = signals::install_stop_handlers().map_err(Error::Signal)?;
        if let Err(e) = signals::install_reaper() {
            saved.restore();
            return Err(Error::Signal(e));
        }

        slot::arm();
        let extra = process_count.max(1) - 1;
        let mut children: Vec<libc::pid_t> = Vec::with_capacity(extra);
        let mut outcome = Ok(ForkRole::Parent);

        for _ in 0..extra {
            // SAFETY: the child only touches this thread's state, the copied
            // queue and async-signal-safe handlers before starting its pool.
            match unsafe { libc::fork() } {
                0 => return Ok(self.run_child(thread_count)),
                -1 => {
                    let e = std::io::Error::last_os_error();
                    error!(spawned = children.len(), requested = extra, error = %e, "fork failed");
                    outcome = Err(Error::Fork(e));
                    break;
                }
                pid => children.push(pid),
            }
        }

        if outcome.is_ok() {
            info!(processes = extra + 1, threads = thread_count, "supervised run started");
            match self.run_pool(thread_count) {
                Ok(()) => self.queue.perform(),
                Err(e) => {
                    error!(error = %e, "parent pool failed to start");
                    outcome = Err(e);
                }
            }
        }

        for &pid in &children {
            // SAFETY: pids came from successful fork calls.
            unsafe { libc::kill(pid, libc::SIGINT) };
        }
        for &pid in &children {
            // the reaper may already have collected it; ECHILD is fine
            unsafe { libc::waitpid(pid, std::ptr::null_mut(), 0) };
        }

        slot::disarm();
        saved.restore();
        debug!(children = children.len(), "supervised run finished");
        outcome
    }

    /// Without process replication only a single-process run is possible.
    #[cfg(not(unix))]
    pub fn perform_in_fork(&self, process_count: usize, thread_count: usize) -> Result<ForkRole> {
        if process_count > 1 {
            return Err(Error::unsupported("process replication requires fork"));
        }

        let _guard = RUN_GUARD.try_lock().ok_or(Error::AlreadyRunning)?;
        slot::arm();
        let outcome = self.run_pool(thread_count);
        slot::disarm();

        if let Err(e) = outcome {
            error!(error = %e, "pool failed to start");
            return Err(e);
        }
        self.queue.perform();
        Ok(ForkRole::Parent)
    }

    // A child cannot report through the return value without being mistaken
    // for the parent, so a failed start is logged and the child still exits.
    #[cfg(unix)]
    fn run_child(&self, thread_count: usize) -> ForkRole {
        if let Err(e) = self.run_pool(thread_count) {
            error!(pid = std::process::id(), error = %e, "child pool failed to start");
        }
        // flush work queued into this copy during the shutdown window
        self.queue.perform();
        self.queue.perform();
        slot::disarm();
        debug!(pid = std::process::id(), "child finished");
        ForkRole::Child
    }

    /// Run a supervised pool in this process until it is stopped.
    fn run_pool(&self, thread_count: usize) -> Result<()> {
        let config = self.config.with_num_threads(thread_count);
        let spawner = ThreadSpawner::from_config(&config);

        let result =
            ThreadPool::launch(self.queue.clone(), &config, &spawner, slot::activate()).map(ThreadPool::wait);
        slot::clear();
        result
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(runtime::global().clone(), Config::default())
    }
}

/// Supervised run over the process-wide queue with default settings.
pub fn perform_in_fork(process_count: usize, thread_count: usize) -> Result<ForkRole> {
    Supervisor::default().perform_in_fork(process_count, thread_count)
}

/// True while this process runs a supervised pool that has not been asked to
/// stop.
pub fn is_fork_active() -> bool {
    slot::is_active()
}

/// Stop this process's supervised pool, as SIGINT would. No-op when none is
/// running.
pub fn stop_fork() {
    slot::request_stop();
}
