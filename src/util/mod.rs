pub mod backoff;
pub mod spin;

pub use backoff::{throttle_thread, Backoff};
pub use spin::{SpinLock, SpinLockGuard};
