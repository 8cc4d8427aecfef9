//! Thin wrapper over the readiness multiplexer, `poll(2)`.
//!
//! The scheduler stores one request per asleep task, index-aligned with the
//! asleep-id list, and hands the whole set to [`wait`] during every switch.

use std::io;
use std::os::fd::RawFd;

/// Readiness direction a sleeping task is waiting for.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Direction {
    Read,
    Write,
}

/// Builds the request record for one descriptor.
pub(crate) fn request(fd: RawFd, direction: Direction) -> libc::pollfd {
    let events = match direction {
        Direction::Read => libc::POLLIN,
        Direction::Write => libc::POLLOUT,
    };

    libc::pollfd {
        fd,
        events,
        revents: 0,
    }
}

/// Waits for readiness on the pending requests.
///
/// Blocks indefinitely when `block` is set (nothing else can run), otherwise
/// polls with a zero timeout so runnable tasks are never starved by I/O
/// waits. A multiplexer syscall failure is unrecoverable.
pub(crate) fn wait(requests: &mut [libc::pollfd], block: bool) {
    let timeout = if block { -1 } else { 0 };

    let result = unsafe {
        libc::poll(
            requests.as_mut_ptr(),
            requests.len() as libc::nfds_t,
            timeout,
        )
    };

    if result < 0 {
        panic!("poll() failed: {}", io::Error::last_os_error());
    }
}

/// Whether a request's readiness event has fired since the last wait.
pub(crate) fn fired(request: &libc::pollfd) -> bool {
    request.revents != 0
}
