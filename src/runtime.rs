//! Process-wide default queue.
//!
//! Most callers share one queue per process. The functions here are thin
//! shorthands over [`global()`]; code that needs isolation builds its own
//! [`TaskQueue`] and passes it explicitly.

use crate::error::Result;
use crate::queue::{Callback, Context, TaskQueue};
use std::sync::{Arc, OnceLock};

static GLOBAL_QUEUE: OnceLock<Arc<TaskQueue>> = OnceLock::new();

/// The shared default queue, created on first use.
pub fn global() -> &'static Arc<TaskQueue> {
    GLOBAL_QUEUE.get_or_init(|| Arc::new(TaskQueue::new()))
}

/// Defer a closure on the default queue.
pub fn defer<F>(f: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    global().defer(f)
}

/// Defer a callback with its opaque context on the default queue.
pub fn enqueue(callback: Option<Callback>, ctx: Context) -> Result<()> {
    global().enqueue(callback, ctx)
}

/// Drain the default queue on the calling thread.
pub fn perform() {
    global().perform()
}

/// True while the default queue holds tasks.
pub fn has_queue() -> bool {
    global().has_pending()
}
