//! Architecture-specific context-switch primitives.
//!
//! Everything that touches raw registers lives here. The rest of the crate
//! only sees saved stack pointers (`*mut c_void`) and machine-word values:
//!
//! - save-and-dispatch entries (`yield_current`, `sleep_read`, `sleep_write`,
//!   `generator_next`, `generator_yield`) spill the callee-saved register set
//!   onto the caller's stack and jump into the scheduling logic,
//! - `restore` / `restore_with_value` load a saved register set and resume it,
//!   the latter delivering a value through the return-value register,
//! - the finish trampolines are the planted return targets of every seeded
//!   stack, bridging a plain `return` from an entry function into the finish
//!   routines.
//!
//! Each backend implements the same surface against its own register set and
//! calling convention.

#[cfg(target_arch = "x86_64")]
mod x86_64;

#[cfg(target_arch = "x86_64")]
pub(crate) use x86_64::*;

#[cfg(not(target_arch = "x86_64"))]
compile_error!("strand has no context-switch backend for this architecture (x86_64 only)");
