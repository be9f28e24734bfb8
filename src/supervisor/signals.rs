//! Signal dispositions for supervised runs.
//!
//! Handlers installed here must stay async-signal-safe: they touch atomics,
//! call `waitpid` and restore `errno`, nothing else. No locks, no allocation
//! and no logging.

use super::slot;
use libc::c_int;
use std::io;
use std::mem;
use std::ptr;

/// SIGINT and SIGTERM dispositions in effect before a supervised run.
pub(crate) struct SavedDispositions {
    interrupt: libc::sigaction,
    terminate: libc::sigaction,
}

impl SavedDispositions {
    pub fn restore(self) {
        // SAFETY: both structs were filled in by a successful sigaction call.
        unsafe {
            libc::sigaction(libc::SIGINT, &self.interrupt, ptr::null_mut());
            libc::sigaction(libc::SIGTERM, &self.terminate, ptr::null_mut());
        }
    }
}

extern "C" fn on_stop_signal(_signal: c_int) {
    slot::request_stop();
}

extern "C" fn on_child_exit(_signal: c_int) {
    // SAFETY: errno access and WNOHANG waitpid are async-signal-safe.
    unsafe {
        let errno = errno_location();
        let saved = *errno;
        while libc::waitpid(-1, ptr::null_mut(), libc::WNOHANG) > 0 {}
        *errno = saved;
    }
}

fn install(signal: c_int, handler: extern "C" fn(c_int)) -> io::Result<libc::sigaction> {
    // SAFETY: zeroed sigaction is a valid starting point; fields are set
    // before use and the kernel validates the rest.
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = handler as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = libc::SA_RESTART | libc::SA_NOCLDSTOP;

        let mut previous: libc::sigaction = mem::zeroed();
        if libc::sigaction(signal, &action, &mut previous) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(previous)
    }
}

/// Route SIGINT and SIGTERM to the supervised pool's stop flag.
pub(crate) fn install_stop_handlers() -> io::Result<SavedDispositions> {
    let interrupt = install(libc::SIGINT, on_stop_signal)?;
    let terminate = match install(libc::SIGTERM, on_stop_signal) {
        Ok(previous) => previous,
        Err(e) => {
            // SAFETY: `interrupt` came from a successful sigaction call.
            unsafe { libc::sigaction(libc::SIGINT, &interrupt, ptr::null_mut()) };
            return Err(e);
        }
    };

    Ok(SavedDispositions {
        interrupt,
        terminate,
    })
}

/// Reap terminated children as soon as they exit. Stays installed after the
/// run.
pub(crate) fn install_reaper() -> io::Result<()> {
    install(libc::SIGCHLD, on_child_exit).map(|_| ())
}

#[cfg(any(target_os = "linux", target_os = "emscripten", target_os = "fuchsia", target_os = "redox"))]
unsafe fn errno_location() -> *mut c_int {
    libc::__errno_location()
}

#[cfg(any(target_os = "android", target_os = "openbsd", target_os = "netbsd"))]
unsafe fn errno_location() -> *mut c_int {
    libc::__errno()
}

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly"
))]
unsafe fn errno_location() -> *mut c_int {
    libc::__error()
}
