//! Task representation and execution.

use std::fmt;

/// Opaque context handed to a callback task.
///
/// The queue never dereferences, owns or frees the pointee; the callback
/// decides what the pointer means and who releases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Context(*mut ());

// SAFETY: a Context is an inert address until a callback interprets it, and
// callbacks are `fn` items whose authors take responsibility for the pointee.
unsafe impl Send for Context {}

impl Context {
    pub const fn null() -> Self {
        Context(std::ptr::null_mut())
    }

    pub fn from_ptr<T>(ptr: *mut T) -> Self {
        Context(ptr.cast())
    }

    /// Carry a plain integer instead of an address.
    pub fn from_usize(value: usize) -> Self {
        Context(value as *mut ())
    }

    pub fn as_ptr<T>(self) -> *mut T {
        self.0.cast()
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::null()
    }
}

/// Callback half of a task.
pub type Callback = fn(Context);

/// A unit of deferred work.
pub struct Task {
    kind: TaskKind,
}

enum TaskKind {
    Callback { func: Callback, ctx: Context },
    Boxed(Box<dyn FnOnce() + Send + 'static>),
}

impl Task {
    /// Create a task from a closure owning its captured state
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Task {
            kind: TaskKind::Boxed(Box::new(f)),
        }
    }

    /// Create a task from a callback and its opaque context; no allocation
    pub fn callback(func: Callback, ctx: Context) -> Self {
        Task {
            kind: TaskKind::Callback { func, ctx },
        }
    }

    /// Execute the task
    pub fn run(self) {
        match self.kind {
            TaskKind::Callback { func, ctx } => func(ctx),
            TaskKind::Boxed(f) => f(),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TaskKind::Callback { ctx, .. } => f
                .debug_struct("Task")
                .field("kind", &"callback")
                .field("ctx", ctx)
                .finish(),
            TaskKind::Boxed(_) => f.debug_struct("Task").field("kind", &"boxed").finish(),
        }
    }
}
