//! The per-process "active pool" record read by signal handlers.
//!
//! Atomics replace a pointer to the running pool: handlers only ever load
//! and store them, both async-signal-safe, and nothing they touch can be
//! freed underneath them.
//!
//! A stop that lands while a supervised run is armed but before its pool is
//! registered (a forked child that has not started its pool yet) is parked
//! in `PENDING` and applied by [`activate`].

use crate::pool::ActiveFlag;
use std::sync::atomic::{AtomicBool, Ordering};

static ARMED: AtomicBool = AtomicBool::new(false);
static PENDING: AtomicBool = AtomicBool::new(false);
static REGISTERED: AtomicBool = AtomicBool::new(false);
static ACTIVE: AtomicBool = AtomicBool::new(false);

// unit tests touching the slot serialize on this
#[cfg(test)]
pub(crate) static TEST_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

/// Start accepting stop requests for a supervised run that has no pool yet.
pub(crate) fn arm() {
    PENDING.store(false, Ordering::SeqCst);
    ARMED.store(true, Ordering::SeqCst);
}

/// End of a supervised run; stray stops are no-ops again.
pub(crate) fn disarm() {
    ARMED.store(false, Ordering::SeqCst);
    PENDING.store(false, Ordering::SeqCst);
}

/// Record a supervised pool as running and hand out its flag. A stop that
/// arrived earlier in the run leaves the flag cleared.
pub(crate) fn activate() -> ActiveFlag {
    ACTIVE.store(true, Ordering::SeqCst);
    REGISTERED.store(true, Ordering::SeqCst);
    // registered first: a stop after this point hits ACTIVE directly
    if PENDING.swap(false, Ordering::SeqCst) {
        ACTIVE.store(false, Ordering::SeqCst);
    }
    ActiveFlag::Static(&ACTIVE)
}

/// Forget the supervised pool.
pub(crate) fn clear() {
    REGISTERED.store(false, Ordering::SeqCst);
    ACTIVE.store(false, Ordering::SeqCst);
}

/// Stop the supervised pool if one is recorded, or park the stop if the run
/// is still setting up. Safe to call from a signal handler.
pub(crate) fn request_stop() {
    if REGISTERED.load(Ordering::SeqCst) {
        ACTIVE.store(false, Ordering::SeqCst);
    } else if ARMED.load(Ordering::SeqCst) {
        PENDING.store(true, Ordering::SeqCst);
    }
}

pub(crate) fn is_active() -> bool {
    REGISTERED.load(Ordering::SeqCst) && ACTIVE.load(Ordering::SeqCst)
}
