//! Supervised runs across forked processes.
//!
//! Everything here forks the test binary, so the tests serialize on one lock
//! and children leave through `_exit` as soon as they report back.

#![cfg(unix)]

use defer_pool::prelude::*;
use defer_pool::{is_fork_active, stop_fork};
use parking_lot::Mutex;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

static SERIAL: Mutex<()> = Mutex::new(());

/// Counter living in anonymous shared memory, visible to every process
/// forked after it was created.
struct SharedCounter {
    ptr: *mut AtomicUsize,
}

impl SharedCounter {
    fn new() -> Self {
        unsafe {
            let raw = libc::mmap(
                ptr::null_mut(),
                mem::size_of::<AtomicUsize>(),
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            );
            assert_ne!(raw, libc::MAP_FAILED, "mmap failed");
            let ptr = raw.cast::<AtomicUsize>();
            ptr::write(ptr, AtomicUsize::new(0));
            Self { ptr }
        }
    }

    fn context(&self) -> Context {
        Context::from_ptr(self.ptr)
    }

    fn get(&self) -> usize {
        unsafe { (*self.ptr).load(Ordering::SeqCst) }
    }
}

impl Drop for SharedCounter {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.cast(), mem::size_of::<AtomicUsize>());
        }
    }
}

fn bump(ctx: Context) {
    let counter = unsafe { &*ctx.as_ptr::<AtomicUsize>() };
    counter.fetch_add(1, Ordering::SeqCst);
}

fn finish(_: Context) {
    stop_fork();
}

fn interrupt_self(_: Context) {
    unsafe {
        libc::kill(libc::getpid(), libc::SIGINT);
    }
}

fn supervisor(queue: &Arc<TaskQueue>) -> Supervisor {
    let config = Config::builder()
        .throttle(Duration::from_micros(100))
        .thread_name_prefix("fork-it")
        .build()
        .unwrap();
    Supervisor::new(queue.clone(), config)
}

fn current_handler(signal: libc::c_int) -> libc::sighandler_t {
    unsafe {
        let mut current: libc::sigaction = mem::zeroed();
        libc::sigaction(signal, ptr::null(), &mut current);
        current.sa_sigaction
    }
}

fn assert_no_children_left() {
    let reaped = unsafe { libc::waitpid(-1, ptr::null_mut(), libc::WNOHANG) };
    assert_eq!(reaped, -1);
    assert_eq!(
        std::io::Error::last_os_error().raw_os_error(),
        Some(libc::ECHILD)
    );
}

fn exit_if_child(result: &defer_pool::Result<ForkRole>) {
    if matches!(result, Ok(ForkRole::Child)) {
        unsafe { libc::_exit(0) };
    }
}

#[test]
fn test_queued_tasks_run_once_per_process() {
    let _serial = SERIAL.lock();

    const PROCESSES: usize = 3;
    const TASKS: usize = 5;

    let counter = SharedCounter::new();
    let queue = Arc::new(TaskQueue::new());
    for _ in 0..TASKS {
        queue.enqueue(Some(bump), counter.context()).unwrap();
    }
    queue.enqueue(Some(finish), Context::null()).unwrap();

    let result = supervisor(&queue).perform_in_fork(PROCESSES, 2);
    exit_if_child(&result);

    assert!(matches!(result, Ok(ForkRole::Parent)));
    assert_eq!(ForkStatus::from(&result).code(), 0);
    assert_eq!(counter.get(), PROCESSES * TASKS);
    assert!(!is_fork_active());
    assert!(!queue.has_pending());
}

#[test]
fn test_zero_processes_runs_in_place() {
    let _serial = SERIAL.lock();

    let counter = SharedCounter::new();
    let queue = Arc::new(TaskQueue::new());
    for _ in 0..4 {
        queue.enqueue(Some(bump), counter.context()).unwrap();
    }
    queue.enqueue(Some(finish), Context::null()).unwrap();

    let result = supervisor(&queue).perform_in_fork(0, 1);
    exit_if_child(&result);

    assert!(matches!(result, Ok(ForkRole::Parent)));
    assert_eq!(counter.get(), 4);
}

#[test]
fn test_interrupt_reaps_children_and_restores_handlers() {
    let _serial = SERIAL.lock();

    const PROCESSES: usize = 4;
    const TASKS: usize = 3;

    let before = current_handler(libc::SIGINT);
    let counter = SharedCounter::new();
    let queue = Arc::new(TaskQueue::new());
    for _ in 0..TASKS {
        queue.enqueue(Some(bump), counter.context()).unwrap();
    }
    queue.enqueue(Some(interrupt_self), Context::null()).unwrap();

    let result = supervisor(&queue).perform_in_fork(PROCESSES, 2);
    exit_if_child(&result);

    assert!(matches!(result, Ok(ForkRole::Parent)));
    assert_eq!(counter.get(), PROCESSES * TASKS);

    assert_no_children_left();
    assert_eq!(current_handler(libc::SIGINT), before);
}

#[test]
fn test_parent_stop_interrupts_every_child() {
    let _serial = SERIAL.lock();

    const PROCESSES: usize = 6;
    const TASKS: usize = 4;

    let interrupt_before = current_handler(libc::SIGINT);
    let terminate_before = current_handler(libc::SIGTERM);

    let counter = SharedCounter::new();
    let queue = Arc::new(TaskQueue::new());
    for _ in 0..TASKS {
        queue.enqueue(Some(bump), counter.context()).unwrap();
    }

    // children never stop themselves; only the parent's SIGINT ends them
    let parent = unsafe { libc::getpid() };
    queue
        .defer(move || {
            if unsafe { libc::getpid() } == parent {
                stop_fork();
            }
        })
        .unwrap();

    let result = supervisor(&queue).perform_in_fork(PROCESSES, 1);
    exit_if_child(&result);

    assert!(matches!(result, Ok(ForkRole::Parent)));
    assert_eq!(counter.get(), PROCESSES * TASKS);
    assert!(!is_fork_active());

    assert_no_children_left();
    assert_eq!(current_handler(libc::SIGINT), interrupt_before);
    assert_eq!(current_handler(libc::SIGTERM), terminate_before);
}

#[test]
fn test_parent_pool_failure_is_reported() {
    let _serial = SERIAL.lock();

    let interrupt_before = current_handler(libc::SIGINT);
    let terminate_before = current_handler(libc::SIGTERM);

    let counter = SharedCounter::new();
    let queue = Arc::new(TaskQueue::new());
    queue.enqueue(Some(bump), counter.context()).unwrap();

    let result = supervisor(&queue).perform_in_fork(1, 0);
    exit_if_child(&result);

    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert_eq!(ForkStatus::from(&result), ForkStatus::SetupError);
    assert_eq!(ForkStatus::from(&result).code(), -1);

    // nothing ran; the task is still there for the caller
    assert_eq!(counter.get(), 0);
    assert!(queue.has_pending());
    assert!(!is_fork_active());

    assert_eq!(current_handler(libc::SIGINT), interrupt_before);
    assert_eq!(current_handler(libc::SIGTERM), terminate_before);
}

#[test]
fn test_tasks_queued_after_fork_stay_local() {
    let _serial = SERIAL.lock();

    let counter = SharedCounter::new();
    let queue = Arc::new(TaskQueue::new());
    let ctx = counter.context();

    // runs in every process, but only the parent schedules the follow-up
    let parent = unsafe { libc::getpid() };
    let q = queue.clone();
    queue
        .defer(move || {
            if unsafe { libc::getpid() } == parent {
                q.enqueue(Some(bump), ctx).unwrap();
            }
            q.enqueue(Some(finish), Context::null()).unwrap();
        })
        .unwrap();

    let result = supervisor(&queue).perform_in_fork(2, 1);
    exit_if_child(&result);

    assert!(matches!(result, Ok(ForkRole::Parent)));
    assert_eq!(counter.get(), 1);
}
