//! Round-robin coroutine scheduler.
//!
//! The scheduler keeps three mutually exclusive id sets: `active` (ordered,
//! with a round-robin cursor), `asleep` (paired index-for-index with pending
//! readiness requests) and the dead-id free list inside the stack pool. A
//! task moves between them only through its own voluntary actions (yielding,
//! sleeping on a descriptor, returning from its entry function) or through
//! an external [`Scheduler::wake_up`].
//!
//! Exactly one context is ever live per scheduler, so none of this state
//! needs a lock: every mutation happens while control is inside the
//! scheduler, which cannot be concurrent with itself.

use crate::TaskId;
use crate::arch;
use crate::sched::poller::{self, Direction};
use crate::stack::{StackPool, default_stack_capacity};

use std::cell::RefCell;
use std::ffi::c_void;
use std::fmt;
use std::os::fd::RawFd;
use std::ptr;

/// Reserved id of the root task: the host thread that created the scheduler.
/// It never finishes through the normal finish path, which is what keeps the
/// active set non-empty.
pub(crate) const ROOT_ID: TaskId = 0;

// Sleep modes passed from the save-and-dispatch entries.
const SLEEP_NONE: usize = 0;
const SLEEP_READ: usize = 1;
const SLEEP_WRITE: usize = 2;

thread_local! {
    /// Thread-local pointer to the scheduler active on this thread.
    ///
    /// Installed for the scheduler's whole lifetime so that the dispatch
    /// routines (entered from raw register-save trampolines) and the
    /// free-function API can find it.
    static CURRENT_CORE: RefCell<*mut Core> = const { RefCell::new(ptr::null_mut()) };
}

fn install_core(core: &mut Core) {
    CURRENT_CORE.with(|cell| {
        let mut slot = cell.borrow_mut();
        assert!(
            slot.is_null(),
            "a scheduler is already active on this thread"
        );
        *slot = core as *mut Core;
    });
}

fn uninstall_core() {
    CURRENT_CORE.with(|cell| {
        *cell.borrow_mut() = ptr::null_mut();
    });
}

/// Returns the current scheduler core, panicking when none is installed.
pub(crate) fn current_core() -> *mut Core {
    let core = CURRENT_CORE.with(|cell| *cell.borrow());

    if core.is_null() {
        panic!("called outside of a scheduler context (create a strand::Scheduler first)");
    }

    core
}

/// Dispatch target of the yield/sleep trampolines: the running task has just
/// saved its registers at `rsp` and hands control to scheduling logic.
pub(crate) extern "C" fn dispatch_switch(rsp: *mut c_void, mode: usize, fd: RawFd) -> ! {
    let core = current_core();

    // SAFETY: one context is live per scheduler; the suspended borrows in
    // dormant task frames are never touched while control is in here.
    unsafe { (*core).switch(rsp, mode, fd) }
}

/// Dispatch target reached when a task's entry function returns.
pub(crate) extern "C" fn task_finish() -> ! {
    let core = current_core();

    // SAFETY: as in `dispatch_switch`.
    unsafe { (*core).finish() }
}

pub(crate) struct Core {
    pool: StackPool,
    active: Vec<TaskId>,
    asleep: Vec<TaskId>,
    // Index-aligned with `asleep`: removing one by position removes the
    // other by the same position.
    requests: Vec<libc::pollfd>,
    cursor: usize,
}

impl Core {
    fn new(stack_capacity: usize) -> Self {
        Self {
            pool: StackPool::new(stack_capacity),
            active: vec![ROOT_ID],
            asleep: Vec::new(),
            requests: Vec::new(),
            cursor: 0,
        }
    }

    pub(crate) fn spawn<F>(&mut self, f: F) -> TaskId
    where
        F: FnOnce() + 'static,
    {
        extern "C" fn launch<F: FnOnce()>(payload: *mut c_void) {
            // SAFETY: `payload` is the Box leaked by the matching `spawn`;
            // the launcher runs at most once per seeding.
            let f = unsafe { Box::from_raw(payload as *mut F) };
            f();
        }

        let payload = Box::into_raw(Box::new(f)) as *mut c_void;
        let id = self.pool.allocate(launch::<F>, payload);
        self.active.push(id);

        log::debug!("spawned task {id}");
        id
    }

    fn switch(&mut self, rsp: *mut c_void, mode: usize, fd: RawFd) -> ! {
        let id = self.active[self.cursor];
        self.pool.set_rsp(id, rsp);

        match mode {
            SLEEP_NONE => self.cursor += 1,
            SLEEP_READ => self.park(id, fd, Direction::Read),
            SLEEP_WRITE => self.park(id, fd, Direction::Write),
            _ => unreachable!("invalid sleep mode {mode}"),
        }

        self.resolve_ready();
        self.dispatch()
    }

    fn finish(&mut self) -> ! {
        let id = self.active[self.cursor];

        if id == ROOT_ID {
            panic!("the root task (id 0) must never reach the finish path");
        }

        log::debug!("task {id} finished");
        self.pool.recycle(id);
        self.active.swap_remove(self.cursor);

        self.resolve_ready();
        self.dispatch()
    }

    fn park(&mut self, id: TaskId, fd: RawFd, direction: Direction) {
        log::trace!("task {id} sleeping on fd {fd} ({direction:?})");
        self.asleep.push(id);
        self.requests.push(poller::request(fd, direction));
        self.active.swap_remove(self.cursor);
    }

    /// Asks the multiplexer which asleep tasks became runnable and moves them
    /// back to the active set. Blocks only when nothing else can run.
    fn resolve_ready(&mut self) {
        if self.requests.is_empty() {
            return;
        }

        poller::wait(&mut self.requests, self.active.is_empty());

        let mut i = 0;
        while i < self.requests.len() {
            if poller::fired(&self.requests[i]) {
                let id = self.asleep[i];
                self.requests.swap_remove(i);
                self.asleep.swap_remove(i);
                self.active.push(id);
                log::trace!("task {id} woke up");
            } else {
                i += 1;
            }
        }
    }

    /// Resumes whatever the cursor lands on. Never returns.
    fn dispatch(&mut self) -> ! {
        assert!(
            !self.active.is_empty(),
            "deadlock: every task is asleep and no readiness request is pending"
        );

        self.cursor %= self.active.len();
        let rsp = self.pool.rsp(self.active[self.cursor]);

        // SAFETY: `rsp` was saved by a save-and-dispatch entry (or seeded by
        // the pool) and its stack is still mapped.
        unsafe { arch::restore(rsp) }
    }

    pub(crate) fn wake_up(&mut self, id: TaskId) {
        // Removal is keyed by position, not by the id value: the asleep list
        // and the request list are index-aligned, and an id's value says
        // nothing about where it sits in either.
        if let Some(position) = self.asleep.iter().position(|&asleep| asleep == id) {
            self.asleep.swap_remove(position);
            self.requests.swap_remove(position);
            self.active.push(id);
            log::trace!("task {id} woken up externally");
        }
    }

    pub(crate) fn current_id(&self) -> TaskId {
        self.active[self.cursor]
    }

    pub(crate) fn alive_count(&self) -> usize {
        self.active.len()
    }

    fn others_pending(&self) -> bool {
        self.active.len() > 1 || !self.asleep.is_empty()
    }
}

/// Cooperative round-robin scheduler owning the task table of one thread.
///
/// Creating a scheduler reserves id 0 for the calling thread itself (the root
/// task) and installs the scheduler as the thread's current one; at most one
/// scheduler may be active per thread at a time. Spawned tasks run when the
/// root task (or any other task) yields.
///
/// # Example
/// ```ignore
/// let mut sched = strand::Scheduler::new();
/// sched.spawn(|| {
///     println!("hello from task {}", strand::current_id());
/// });
/// sched.join();
/// ```
pub struct Scheduler {
    core: Box<Core>,
}

impl Scheduler {
    /// Creates a scheduler with the default stack capacity.
    pub fn new() -> Self {
        Self::with_stack_capacity(default_stack_capacity())
    }

    pub(crate) fn with_stack_capacity(stack_capacity: usize) -> Self {
        let mut core = Box::new(Core::new(stack_capacity));
        install_core(&mut core);

        Self { core }
    }

    /// Spawns a task and appends it to the active set.
    ///
    /// Returns the new task's id immediately; the task does not run until it
    /// is scheduled.
    pub fn spawn<F>(&mut self, f: F) -> TaskId
    where
        F: FnOnce() + 'static,
    {
        self.core.spawn(f)
    }

    /// Runs the scheduler from the root task until every other task has
    /// finished.
    pub fn join(&mut self) {
        while self.core.others_pending() {
            // SAFETY: this scheduler is installed as the thread's current one.
            unsafe { arch::yield_current() }
        }
    }

    /// Id of the task presently executing.
    pub fn current_id(&self) -> TaskId {
        self.core.current_id()
    }

    /// Number of tasks in the active set (asleep tasks are not counted).
    pub fn alive_count(&self) -> usize {
        self.core.alive_count()
    }

    /// Moves an asleep task back to the active set without waiting for its
    /// readiness event. A no-op when `id` is not asleep.
    pub fn wake_up(&mut self, id: TaskId) {
        self.core.wake_up(id);
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("active", &self.core.active.len())
            .field("asleep", &self.core.asleep.len())
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        uninstall_core();
    }
}
