//! Stackful generators with an explicit yield/next protocol.
//!
//! A generator is an independently executing call stack, separate from the
//! coroutine table: caller-owned, driven by [`Generator::next`], suspended by
//! [`yield_value`], unmapped on drop. Values cross the boundary as machine
//! words (`usize`), delivered through the architecture's return-value
//! convention.
//!
//! # Nesting
//!
//! Every switch targets whatever sits on top of the calling thread's frame
//! stack, a LIFO of suspended `next` activations seeded with an implicit root
//! frame for the thread itself. A generator body may therefore drive further
//! generators; each `yield_value` unwinds exactly one level of the chain of
//! `next` calls that led to it. A single saved slot could not represent more
//! than one level of nested drive; the stack is what makes composition work.
//!
//! # Example
//! ```ignore
//! let mut counter = strand::Generator::new(|limit| {
//!     let mut i = 0;
//!     while i < limit {
//!         strand::yield_value(i);
//!         i += 1;
//!     }
//! });
//!
//! while let Some(value) = counter.next(3) {
//!     println!("{value}"); // 0, 1, 2
//! }
//! ```

use crate::arch;
use crate::error::ConfigError;
use crate::stack::{StackRegion, default_stack_capacity, validate_capacity};

use std::cell::RefCell;
use std::ffi::c_void;
use std::fmt;
use std::ptr;

/// Value delivered to the suspended driver when a generator's body returns.
/// Callers never see it: [`Generator::next`] reports death as `None`.
const DONE: usize = 0;

/// Per-generator record shared between the handle and the dispatch routines.
struct RawGen {
    rsp: *mut c_void,
    // The implicit root frame stands for the host thread and owns no region.
    #[allow(dead_code)]
    region: Option<StackRegion>,
    fresh: bool,
    dead: bool,
    /// Argument of the first `next`, read back by the launcher.
    start_arg: usize,
    payload: *mut c_void,
    /// Releases the boxed body of a generator that never ran; disarmed once
    /// the launcher takes ownership.
    drop_payload: Option<unsafe fn(*mut c_void)>,
}

impl RawGen {
    fn root() -> Self {
        Self {
            rsp: ptr::null_mut(),
            region: None,
            fresh: false,
            dead: false,
            start_arg: 0,
            payload: ptr::null_mut(),
            drop_payload: None,
        }
    }
}

thread_local! {
    /// The calling thread's generator frame stack.
    ///
    /// Thread-local so that independent threads can each drive unrelated
    /// generator hierarchies with no shared mutable state between them.
    static FRAMES: RefCell<Vec<*mut RawGen>> = const { RefCell::new(Vec::new()) };
}

/// Runs `f` on the frame stack, lazily seeding the implicit root frame.
/// The root record is leaked once per thread that ever drives a generator.
fn with_frames<R>(f: impl FnOnce(&mut Vec<*mut RawGen>) -> R) -> R {
    FRAMES.with(|cell| {
        let mut frames = cell.borrow_mut();
        if frames.is_empty() {
            frames.push(Box::into_raw(Box::new(RawGen::root())));
        }
        f(&mut frames)
    })
}

/// Dispatch target of the `next` trampoline: the driver has saved its
/// registers at `rsp` and wants to switch into `g`, delivering `arg`.
pub(crate) extern "C" fn dispatch_next(g: *mut c_void, arg: usize, rsp: *mut c_void) -> ! {
    let g = g as *mut RawGen;

    let fresh = with_frames(|frames| {
        let top = *frames
            .last()
            .expect("the frame stack holds at least the root frame");

        // SAFETY: frame records outlive their suspended activations, and
        // only the single live context on this thread touches them.
        unsafe {
            (*top).rsp = rsp;
            frames.push(g);

            if (*g).fresh {
                (*g).fresh = false;
                (*g).drop_payload = None; // the launcher owns the body now
                (*g).start_arg = arg;
                true
            } else {
                false
            }
        }
    });

    // The frame-stack borrow is released before control leaves this routine.
    unsafe {
        let target = (*g).rsp;
        if fresh {
            arch::restore(target)
        } else {
            arch::restore_with_value(target, arg)
        }
    }
}

/// Dispatch target of the `yield_value` trampoline: the running generator
/// suspends at `rsp` and delivers `value` to the frame below it.
pub(crate) extern "C" fn dispatch_return(value: usize, rsp: *mut c_void) -> ! {
    let target = with_frames(|frames| {
        let top = *frames
            .last()
            .expect("the frame stack holds at least the root frame");

        // SAFETY: as in `dispatch_next`.
        unsafe {
            (*top).rsp = rsp;
        }

        frames.pop();
        *frames
            .last()
            .expect("a yielding generator has a driver below it")
    });

    // SAFETY: the driver saved this frame in its own `next` trampoline.
    unsafe { arch::restore_with_value((*target).rsp, value) }
}

/// Reached when a generator's body returns: mark it dead, pop it, resume the
/// driver with the done sentinel. The record stays alive for the handle to
/// observe; the handle's drop unmaps the stack.
pub(crate) extern "C" fn finish_current() -> ! {
    let target = with_frames(|frames| {
        let top = frames.pop().expect("a finished generator has a frame");

        // SAFETY: as in `dispatch_next`.
        unsafe {
            (*top).dead = true;
        }

        *frames
            .last()
            .expect("a finished generator has a driver below it")
    });

    // SAFETY: as in `dispatch_return`.
    unsafe { arch::restore_with_value((*target).rsp, DONE) }
}

/// Suspends the calling generator body, delivering `value` as the result of
/// the `next` call that resumed it.
///
/// Returns the argument of the following `next`. Callable only from inside a
/// generator body; panics when the calling thread is not running one.
pub fn yield_value(value: usize) -> usize {
    let inside = with_frames(|frames| frames.len() > 1);
    assert!(inside, "yield_value() called outside of a generator");

    // SAFETY: the frame stack has a generator on top (checked above), so the
    // suspend/resume pair is well-formed.
    unsafe { arch::generator_yield(value) }
}

/// A stackful generator handle.
///
/// Created with [`Generator::new`], driven with [`Generator::next`], and
/// destroyed by dropping, which unmaps the generator's stack. Once the body
/// returns the generator is dead: every further `next` is a stable no-op
/// returning `None` and never resumes execution.
pub struct Generator {
    raw: *mut RawGen,
}

impl Generator {
    /// Creates a generator with the default stack capacity.
    ///
    /// The body's argument is the value passed to the first [`next`] call;
    /// the values of later `next` calls arrive as the results of
    /// [`yield_value`].
    ///
    /// [`next`]: Generator::next
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce(usize) + 'static,
    {
        Self::create(default_stack_capacity(), body)
    }

    /// Creates a generator with a caller-chosen stack capacity, validated the
    /// same way as [`SchedulerBuilder::stack_capacity`].
    ///
    /// [`SchedulerBuilder::stack_capacity`]: crate::SchedulerBuilder::stack_capacity
    pub fn with_stack_capacity<F>(capacity: usize, body: F) -> Result<Self, ConfigError>
    where
        F: FnOnce(usize) + 'static,
    {
        validate_capacity(capacity)?;
        Ok(Self::create(capacity, body))
    }

    fn create<F>(capacity: usize, body: F) -> Self
    where
        F: FnOnce(usize) + 'static,
    {
        extern "C" fn launch<F: FnOnce(usize)>(payload: *mut c_void) {
            // SAFETY: `payload` is the Box leaked by `create`; the launcher
            // runs at most once per generator.
            let body = unsafe { Box::from_raw(payload as *mut F) };

            let first = with_frames(|frames| {
                let top = *frames.last().expect("a running generator has a frame");
                // SAFETY: the top frame is this generator's own record.
                unsafe { (*top).start_arg }
            });

            body(first)
        }

        unsafe fn drop_payload<F>(payload: *mut c_void) {
            // SAFETY: only reached when the launcher never ran, so the Box
            // is still owned by the record.
            drop(unsafe { Box::from_raw(payload as *mut F) });
        }

        let mut region = StackRegion::allocate(capacity);
        let payload = Box::into_raw(Box::new(body)) as *mut c_void;
        let rsp = region.seed(launch::<F>, payload, arch::generator_finish_entry);

        let raw = Box::into_raw(Box::new(RawGen {
            rsp,
            region: Some(region),
            fresh: true,
            dead: false,
            start_arg: 0,
            payload,
            drop_payload: Some(drop_payload::<F>),
        }));

        log::trace!("created generator {raw:?} with a {capacity} byte stack");
        Self { raw }
    }

    /// Resumes the generator, delivering `arg`, until it yields or returns.
    ///
    /// The first call starts the body with `arg` as its argument; later calls
    /// deliver `arg` as the result of the body's pending [`yield_value`].
    /// Returns the yielded value, or `None` once the body has returned,
    /// stable on every subsequent call.
    pub fn next(&mut self, arg: usize) -> Option<usize> {
        // SAFETY: `raw` stays valid for the handle's lifetime.
        if unsafe { (*self.raw).dead } {
            return None;
        }

        let already_driven = with_frames(|frames| frames.contains(&self.raw));
        assert!(
            !already_driven,
            "generator is already being driven on this thread"
        );

        // SAFETY: the generator is suspended (fresh or mid-yield) and not on
        // the frame stack, so switching into it is well-formed.
        let value = unsafe { arch::generator_next(self.raw as *mut c_void, arg) };

        // SAFETY: as above; the switch has returned control here.
        if unsafe { (*self.raw).dead } {
            None
        } else {
            Some(value)
        }
    }

    /// Whether the body has returned.
    pub fn is_done(&self) -> bool {
        // SAFETY: `raw` stays valid for the handle's lifetime.
        unsafe { (*self.raw).dead }
    }

    /// Iterator over the remaining yields, resuming with the same `arg`
    /// every time.
    pub fn iter_with(&mut self, arg: usize) -> GeneratorIter<'_> {
        GeneratorIter {
            generator: self,
            arg,
        }
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator")
            .field("done", &self.is_done())
            .finish()
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        // SAFETY: the handle uniquely owns the record; dropping it unmaps
        // the stack region. A suspended body is discarded without unwinding.
        unsafe {
            let raw = Box::from_raw(self.raw);
            if let Some(drop_payload) = raw.drop_payload {
                drop_payload(raw.payload);
            }
        }
    }
}

/// Iterator returned by [`Generator::iter_with`].
pub struct GeneratorIter<'a> {
    generator: &'a mut Generator,
    arg: usize,
}

impl Iterator for GeneratorIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        self.generator.next(self.arg)
    }
}
