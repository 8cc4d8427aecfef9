//! Stack memory and context bookkeeping.
//!
//! [`StackRegion`] owns one fixed-capacity, downward-growing stack mapping and
//! knows how to fabricate the initial register-save frame on it. [`StackPool`]
//! owns the scheduler's context table together with the dead-id free list:
//! finished ids keep their mapping and are reseeded on reuse, so total mapped
//! memory stays bounded under spawn/finish churn.

use crate::TaskId;
use crate::arch;
use crate::error::ConfigError;

use std::ffi::{c_int, c_void};
use std::io;
use std::ptr;

#[cfg(target_os = "linux")]
const STACK_MAP_FLAGS: c_int =
    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_STACK | libc::MAP_GROWSDOWN;
#[cfg(not(target_os = "linux"))]
const STACK_MAP_FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

/// Smallest accepted stack capacity, in pages.
const MIN_STACK_PAGES: usize = 4;

pub(crate) fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

/// Validates a caller-chosen stack capacity.
pub(crate) fn validate_capacity(bytes: usize) -> Result<(), ConfigError> {
    let page = page_size();

    if bytes < MIN_STACK_PAGES * page {
        return Err(ConfigError::StackTooSmall {
            requested: bytes,
            minimum: MIN_STACK_PAGES * page,
        });
    }

    if bytes % page != 0 {
        return Err(ConfigError::UnalignedStackCapacity {
            requested: bytes,
            page_size: page,
        });
    }

    Ok(())
}

/// Default stack capacity: a large multiple of the page size, 4 MiB on
/// 4 KiB-page systems.
pub(crate) fn default_stack_capacity() -> usize {
    1024 * page_size()
}

/// One anonymous private mapping used as a task or generator stack.
pub(crate) struct StackRegion {
    base: *mut u8,
    capacity: usize,
}

impl StackRegion {
    /// Maps a fresh region. Mapping failure is unrecoverable resource
    /// exhaustion: panic with the OS error, no retry.
    pub(crate) fn allocate(capacity: usize) -> Self {
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                capacity,
                libc::PROT_READ | libc::PROT_WRITE,
                STACK_MAP_FLAGS,
                -1,
                0,
            )
        };

        if base == libc::MAP_FAILED {
            panic!(
                "failed to map a {} byte stack: {}",
                capacity,
                io::Error::last_os_error()
            );
        }

        Self {
            base: base as *mut u8,
            capacity,
        }
    }

    /// Writes the initial fabricated register-save frame at the top of the
    /// region and returns the seeded stack pointer.
    ///
    /// The first resume pops the zeroed callee-saved set, pops `payload` into
    /// the argument register and returns into `launcher`; a plain return from
    /// the launcher lands in `finish`, exactly as if the launcher had been
    /// called by it.
    pub(crate) fn seed(
        &mut self,
        launcher: extern "C" fn(*mut c_void),
        payload: *mut c_void,
        finish: unsafe extern "C" fn() -> !,
    ) -> *mut c_void {
        let top = unsafe { self.base.add(self.capacity) } as *mut usize;

        unsafe {
            let mut slot = top;
            slot = slot.sub(1);
            slot.write(finish as usize);
            slot = slot.sub(1);
            slot.write(launcher as usize);
            slot = slot.sub(1);
            slot.write(payload as usize); // rdi
            for _ in 0..6 {
                // rbp, rbx, r12, r13, r14, r15
                slot = slot.sub(1);
                slot.write(0);
            }
            slot as *mut c_void
        }
    }
}

impl Drop for StackRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut c_void, self.capacity);
        }
    }
}

/// Saved execution state of one task: its stack pointer and the stack it runs
/// on. The reserved root task runs on the host thread's own stack and owns no
/// region.
pub(crate) struct TaskContext {
    pub(crate) rsp: *mut c_void,
    region: Option<StackRegion>,
}

/// Context table plus dead-id free list.
pub(crate) struct StackPool {
    contexts: Vec<TaskContext>,
    free: Vec<TaskId>,
    stack_capacity: usize,
}

impl StackPool {
    /// Creates the pool with the reserved root context at id 0.
    pub(crate) fn new(stack_capacity: usize) -> Self {
        Self {
            contexts: vec![TaskContext {
                rsp: ptr::null_mut(),
                region: None,
            }],
            free: Vec::new(),
            stack_capacity,
        }
    }

    /// Obtains an id with a seeded stack: reuses a dead id (and its mapping)
    /// when one is available, otherwise maps a fresh region.
    pub(crate) fn allocate(
        &mut self,
        launcher: extern "C" fn(*mut c_void),
        payload: *mut c_void,
    ) -> TaskId {
        let id = match self.free.pop() {
            Some(id) => {
                log::trace!("reusing dead task id {id}");
                id
            }
            None => {
                self.contexts.push(TaskContext {
                    rsp: ptr::null_mut(),
                    region: Some(StackRegion::allocate(self.stack_capacity)),
                });
                self.contexts.len() - 1
            }
        };

        let context = &mut self.contexts[id];
        let region = context
            .region
            .as_mut()
            .expect("non-root context owns a stack region");
        context.rsp = region.seed(launcher, payload, arch::task_finish_entry);

        id
    }

    /// Returns a finished id to the free list. The mapping is kept for reuse,
    /// never unmapped individually.
    pub(crate) fn recycle(&mut self, id: TaskId) {
        self.free.push(id);
    }

    pub(crate) fn rsp(&self, id: TaskId) -> *mut c_void {
        self.contexts[id].rsp
    }

    pub(crate) fn set_rsp(&mut self, id: TaskId, rsp: *mut c_void) {
        self.contexts[id].rsp = rsp;
    }
}
