//! FIFO queue of deferred tasks.
//!
//! All pointer and counter updates happen under one [`SpinLock`]. The lock
//! is never held while a task runs, so a running task may enqueue more work
//! into the queue that is executing it.

mod arena;
pub mod task;

pub use arena::DEFAULT_ARENA_CAPACITY;
pub use task::{Callback, Context, Task};

use crate::error::{Error, Result};
use crate::util::SpinLock;
use arena::{NodeArena, NodeId};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Point-in-time view of a queue's node accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    pub capacity: usize,
    pub arena_initialized: bool,
    pub free_slots: usize,
    pub pending: usize,
    pub heap_allocated: u64,
    pub heap_released: u64,
}

impl QueueStats {
    /// Heap nodes currently linked in the queue.
    pub fn heap_live(&self) -> u64 {
        self.heap_allocated - self.heap_released
    }
}

struct QueueState {
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
    arena: NodeArena,
}

// SAFETY: the NodeIds in `head`/`tail` point into storage owned by `arena`
// and are only followed while the queue lock is held.
unsafe impl Send for QueueState {}

impl QueueState {
    fn push_back(&mut self, task: Task) -> std::result::Result<(), (Task, Error)> {
        let id = match self.arena.acquire() {
            Ok(id) => id,
            Err(e) => return Err((task, e)),
        };

        self.arena.get_mut(id).task = Some(task);
        match self.tail {
            Some(tail) => self.arena.get_mut(tail).next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
        Ok(())
    }

    fn pop_front(&mut self) -> Option<Task> {
        let id = self.head?;
        let node = self.arena.get_mut(id);
        let task = node.task.take();
        self.head = node.next.take();
        if self.head.is_none() {
            self.tail = None;
        }
        self.len -= 1;
        self.arena.release(id);
        task
    }
}

impl Drop for QueueState {
    fn drop(&mut self) {
        while self.pop_front().is_some() {}
    }
}

pub struct TaskQueue {
    state: SpinLock<QueueState>,
    pending: AtomicUsize,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ARENA_CAPACITY)
    }

    /// Queue whose arena holds `capacity` nodes; zero means every node is
    /// heap-allocated.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: SpinLock::new(QueueState {
                head: None,
                tail: None,
                len: 0,
                arena: NodeArena::new(capacity),
            }),
            pending: AtomicUsize::new(0),
        }
    }

    /// Append a callback with its context. `None` is rejected.
    pub fn enqueue(&self, callback: Option<Callback>, ctx: Context) -> Result<()> {
        let func = callback.ok_or_else(|| Error::invalid_argument("callback is missing"))?;
        self.push(Task::callback(func, ctx))
    }

    /// Append a closure.
    pub fn defer<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(Task::new(f))
    }

    pub fn push(&self, task: Task) -> Result<()> {
        let mut state = self.state.lock();
        match state.push_back(task) {
            Ok(()) => {
                self.pending.store(state.len, Ordering::Release);
                Ok(())
            }
            Err((task, e)) => {
                // the rejected task may own state whose drop enqueues
                drop(state);
                drop(task);
                Err(e)
            }
        }
    }

    /// Run tasks until the queue is observed empty. Tasks enqueued while this
    /// call is running are executed by it.
    pub fn perform(&self) {
        loop {
            let task = {
                let mut state = self.state.lock();
                let task = state.pop_front();
                self.pending.store(state.len, Ordering::Release);
                task
            };

            match task {
                Some(task) => task.run(),
                None => break,
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) > 0
    }

    pub fn len(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        !self.has_pending()
    }

    /// Drop every pending task without running it. Returns how many were
    /// discarded.
    pub fn clear(&self) -> usize {
        let discarded: Vec<Task> = {
            let mut state = self.state.lock();
            let mut tasks = Vec::with_capacity(state.len);
            while let Some(task) = state.pop_front() {
                tasks.push(task);
            }
            self.pending.store(0, Ordering::Release);
            tasks
        };
        discarded.len()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            capacity: state.arena.capacity(),
            arena_initialized: state.arena.is_initialized(),
            free_slots: state.arena.free_slots(),
            pending: state.len,
            heap_allocated: state.arena.heap_allocated(),
            heap_released: state.arena.heap_released(),
        }
    }

    pub fn lock_throttle(&self) -> Duration {
        self.state.throttle()
    }

    pub fn set_lock_throttle(&self, throttle: Duration) {
        self.state.set_throttle(throttle);
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.len())
            .field("lock_throttle", &self.lock_throttle())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_fifo_order() {
        let queue = TaskQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let log = log.clone();
            queue.defer(move || log.lock().push(name)).unwrap();
        }
        queue.perform();

        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_missing_callback_is_rejected() {
        let queue = TaskQueue::new();
        let result = queue.enqueue(None, Context::null());

        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(!queue.has_pending());
        assert!(!queue.stats().arena_initialized);
    }

    #[test]
    fn test_nested_enqueue_runs_in_same_pass() {
        let queue = Arc::new(TaskQueue::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let q = queue.clone();
        let c = counter.clone();
        queue
            .defer(move || {
                let c2 = c.clone();
                q.defer(move || {
                    c2.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        queue.perform();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(!queue.has_pending());
    }

    #[test]
    fn test_clear_discards_without_running() {
        let queue = TaskQueue::with_capacity(2);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let c = counter.clone();
            queue
                .defer(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        assert_eq!(queue.clear(), 5);
        queue.perform();

        let stats = queue.stats();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.free_slots, 2);
        assert_eq!(stats.heap_live(), 0);
    }

    #[test]
    fn test_drop_releases_pending_nodes() {
        let witness = Arc::new(());
        {
            let queue = TaskQueue::with_capacity(1);
            for _ in 0..3 {
                let w = witness.clone();
                queue.defer(move || drop(w)).unwrap();
            }
            assert_eq!(Arc::strong_count(&witness), 4);
        }
        assert_eq!(Arc::strong_count(&witness), 1);
    }
}
