//! defer-pool - deferred task execution
//!
//! Queue a callback now, run it later. Tasks go into a FIFO [`TaskQueue`]
//! backed by a reusable node arena; a [`ThreadPool`] drains the queue on a
//! fixed set of worker threads; a [`Supervisor`] forks the whole arrangement
//! across processes and shuts it down on SIGINT/SIGTERM.
//!
//! # Quick Start
//!
//! ```no_run
//! use defer_pool::prelude::*;
//!
//! defer_pool::defer(|| println!("runs later")).unwrap();
//!
//! // Drain on the current thread...
//! defer_pool::perform();
//!
//! // ...or on a pool of workers.
//! let pool = ThreadPool::start(4).unwrap();
//! defer_pool::defer(|| println!("runs on a worker")).unwrap();
//! pool.stop();
//! pool.wait();
//! ```
//!
//! # Guarantees
//!
//! - **FIFO**: a queue runs tasks in the order they were enqueued.
//! - **Reentrant**: the queue lock is never held while a task runs, so tasks
//!   may enqueue more tasks; [`TaskQueue::perform`] runs those too.
//! - **Cooperative shutdown**: stopping a pool only clears a flag. Workers
//!   finish their current drain pass first.
//! - **No isolation**: a panicking task takes its worker thread down with it.

// Lint configuration
#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod pool;
pub mod prelude;
pub mod queue;
pub mod runtime;
pub mod supervisor;
pub mod util;

// Re-export key types at crate root
pub use config::{Config, ConfigBuilder, DEFAULT_THROTTLE};
pub use error::{Error, Result};
pub use pool::{Spawner, ThreadPool, ThreadSpawner};
pub use queue::{Callback, Context, QueueStats, Task, TaskQueue, DEFAULT_ARENA_CAPACITY};
pub use runtime::{defer, enqueue, global, has_queue, perform};
pub use supervisor::{is_fork_active, perform_in_fork, stop_fork, ForkRole, ForkStatus, Supervisor};
