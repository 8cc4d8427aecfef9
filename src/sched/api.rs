//! Free-function API for code running inside a task.
//!
//! Spawned tasks hold no reference to their [`Scheduler`], so the suspension
//! points are exposed as free functions resolved through the thread's current
//! scheduler, the same way [`Scheduler::spawn`] resolves for the root task.
//! Every function here panics when no scheduler is active on the thread.
//!
//! [`Scheduler`]: crate::Scheduler
//! [`Scheduler::spawn`]: crate::Scheduler::spawn

use crate::TaskId;
use crate::arch;
use crate::sched::core::current_core;

use std::os::fd::RawFd;

/// Spawns a task on the thread's current scheduler and returns its id.
pub fn spawn<F>(f: F) -> TaskId
where
    F: FnOnce() + 'static,
{
    let core = current_core();

    // SAFETY: one live context per scheduler; see `dispatch_switch`.
    unsafe { (*core).spawn(f) }
}

/// Suspends the calling task and gives every other active task one turn
/// before it runs again.
pub fn yield_now() {
    current_core();

    // SAFETY: a scheduler is installed on this thread (checked above).
    unsafe { arch::yield_current() }
}

/// Suspends the calling task until `fd` reports read readiness.
///
/// One check per invocation: a task that needs to wait again must re-issue
/// the call. The descriptor must stay open while the task sleeps on it.
pub fn sleep_read(fd: RawFd) {
    current_core();

    // SAFETY: as in `yield_now`.
    unsafe { arch::sleep_read(fd) }
}

/// Suspends the calling task until `fd` reports write readiness.
pub fn sleep_write(fd: RawFd) {
    current_core();

    // SAFETY: as in `yield_now`.
    unsafe { arch::sleep_write(fd) }
}

/// Id of the task presently executing.
pub fn current_id() -> TaskId {
    let core = current_core();

    // SAFETY: as in `spawn`.
    unsafe { (*core).current_id() }
}

/// Number of tasks in the active set.
pub fn alive_count() -> usize {
    let core = current_core();

    // SAFETY: as in `spawn`.
    unsafe { (*core).alive_count() }
}

/// Wakes an asleep task without waiting for its readiness event.
pub fn wake_up(id: TaskId) {
    let core = current_core();

    // SAFETY: as in `spawn`.
    unsafe { (*core).wake_up(id) }
}
