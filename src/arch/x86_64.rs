//! x86_64 System V backend.
//!
//! A suspended context is seven machine words on its own stack, lowest
//! address first: r15, r14, r13, r12, rbx, rbp, rdi. `rdi` rides along with
//! the callee-saved set so that the first resume of a fresh stack pops the
//! launcher's argument straight into the argument register.
//!
//! The save entries spill that frame, then tail-jump into a dispatch routine
//! with the saved stack pointer as an argument. Dispatch routines never
//! return; they end by restoring some other frame. The `sub rsp, 8` before
//! each jump keeps the stack at the alignment a function entry expects, since
//! a `jmp` does not push a return address the way a `call` would.

use crate::generator;
use crate::sched;

use std::arch::naked_asm;
use std::ffi::c_void;
use std::os::fd::RawFd;

/// Save the caller and rotate the round-robin cursor (sleep mode NONE).
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn yield_current() {
    naked_asm!(
        "push rdi",
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov rdi, rsp", // saved frame
        "xor esi, esi", // mode = SLEEP_NONE
        "xor edx, edx",
        "sub rsp, 8",
        "jmp {dispatch}",
        dispatch = sym sched::core::dispatch_switch,
    )
}

/// Save the caller and park it until `fd` is ready for reading.
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn sleep_read(_fd: RawFd) {
    naked_asm!(
        "push rdi",
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov edx, edi", // fd
        "mov rdi, rsp", // saved frame
        "mov esi, 1",   // mode = SLEEP_READ
        "sub rsp, 8",
        "jmp {dispatch}",
        dispatch = sym sched::core::dispatch_switch,
    )
}

/// Save the caller and park it until `fd` is ready for writing.
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn sleep_write(_fd: RawFd) {
    naked_asm!(
        "push rdi",
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov edx, edi", // fd
        "mov rdi, rsp", // saved frame
        "mov esi, 2",   // mode = SLEEP_WRITE
        "sub rsp, 8",
        "jmp {dispatch}",
        dispatch = sym sched::core::dispatch_switch,
    )
}

/// Save the caller and switch into generator `g`, delivering `arg`.
///
/// Returns (in the caller's frame, once something switches back) the value
/// passed to the matching `yield_value` or the done sentinel.
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn generator_next(_g: *mut c_void, _arg: usize) -> usize {
    naked_asm!(
        "push rdi",
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov rdx, rsp", // saved frame; g and arg stay in rdi/rsi
        "sub rsp, 8",
        "jmp {dispatch}",
        dispatch = sym generator::dispatch_next,
    )
}

/// Save the running generator and suspend back to its driver with `arg`.
///
/// Returns the argument of the next resume.
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn generator_yield(_arg: usize) -> usize {
    naked_asm!(
        "push rdi",
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov rsi, rsp", // saved frame; arg stays in rdi
        "sub rsp, 8",
        "jmp {dispatch}",
        dispatch = sym generator::dispatch_return,
    )
}

/// Resume a saved frame with no value delivered.
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn restore(_rsp: *mut c_void) -> ! {
    naked_asm!(
        "mov rsp, rdi",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "pop rdi",
        "ret",
    )
}

/// Resume a saved frame, delivering `value` as the result of the call it
/// suspended in.
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn restore_with_value(_rsp: *mut c_void, _value: usize) -> ! {
    naked_asm!(
        "mov rsp, rdi",
        "mov rax, rsi",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "pop rdi",
        "ret",
    )
}

/// Planted return target of every coroutine stack: entered by the `ret` of a
/// finished entry function, realigns the stack and enters the finish path.
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn task_finish_entry() -> ! {
    naked_asm!(
        "sub rsp, 8",
        "jmp {finish}",
        finish = sym sched::core::task_finish,
    )
}

/// Planted return target of every generator stack.
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn generator_finish_entry() -> ! {
    naked_asm!(
        "sub rsp, 8",
        "jmp {finish}",
        finish = sym generator::finish_current,
    )
}
