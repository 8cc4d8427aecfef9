use std::sync::{Arc, Mutex};

use strand::{Scheduler, sleep_read, sleep_write, yield_now};

fn pipe() -> (i32, i32) {
    let mut fds = [0i32; 2];
    let res = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(res, 0, "pipe() failed");
    (fds[0], fds[1])
}

#[test]
fn sleeping_reader_resumes_only_after_write() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (rfd, wfd) = pipe();
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let mut sched = Scheduler::new();

    let l = log.clone();
    sched.spawn(move || {
        l.lock().unwrap().push("a:sleep");
        sleep_read(rfd);
        // Control continues right here once rfd is readable.
        l.lock().unwrap().push("a:resumed");

        let mut byte = [0u8; 1];
        let n = unsafe { libc::read(rfd, byte.as_mut_ptr() as *mut _, 1) };
        assert_eq!(n, 1);
        assert_eq!(byte[0], 7);
    });

    let l = log.clone();
    sched.spawn(move || {
        l.lock().unwrap().push("b:write");
        let byte = [7u8; 1];
        let n = unsafe { libc::write(wfd, byte.as_ptr() as *const _, 1) };
        assert_eq!(n, 1);

        yield_now();
        l.lock().unwrap().push("b:done");
    });

    sched.join();

    let log = log.lock().unwrap();
    assert_eq!(log[0], "a:sleep", "the reader should run and sleep first");

    let wrote = log.iter().position(|e| *e == "b:write").unwrap();
    let resumed = log.iter().position(|e| *e == "a:resumed").unwrap();
    assert!(
        wrote < resumed,
        "the reader must not resume before the writer made the pipe readable"
    );

    unsafe {
        libc::close(rfd);
        libc::close(wfd);
    }
}

#[test]
fn sleep_write_returns_when_pipe_has_room() {
    let (rfd, wfd) = pipe();
    let done = Arc::new(Mutex::new(false));
    let mut sched = Scheduler::new();

    let d = done.clone();
    sched.spawn(move || {
        // An empty pipe is immediately writable; one readiness check.
        sleep_write(wfd);

        let byte = [1u8; 1];
        let n = unsafe { libc::write(wfd, byte.as_ptr() as *const _, 1) };
        assert_eq!(n, 1);
        *d.lock().unwrap() = true;
    });

    sched.join();
    assert!(*done.lock().unwrap());

    unsafe {
        libc::close(rfd);
        libc::close(wfd);
    }
}

#[test]
fn blocked_writer_resumes_once_the_pipe_drains() {
    let (rfd, wfd) = pipe();

    // Fill the pipe so the next write would block.
    let flags = unsafe { libc::fcntl(wfd, libc::F_GETFL) };
    assert!(flags >= 0);
    let res = unsafe { libc::fcntl(wfd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    assert_eq!(res, 0);

    let chunk = [0u8; 4096];
    while unsafe { libc::write(wfd, chunk.as_ptr() as *const _, chunk.len()) } > 0 {}

    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let mut sched = Scheduler::new();

    let l = log.clone();
    sched.spawn(move || {
        l.lock().unwrap().push("w:sleep");
        sleep_write(wfd);
        l.lock().unwrap().push("w:resumed");

        let byte = [9u8; 1];
        let n = unsafe { libc::write(wfd, byte.as_ptr() as *const _, 1) };
        assert_eq!(n, 1, "the pipe should have room once the sleep resolves");
    });

    let l = log.clone();
    sched.spawn(move || {
        l.lock().unwrap().push("d:drain");
        // Free well past one PIPE_BUF so the full pipe reports writability.
        let mut drained = 0;
        let mut buf = [0u8; 4096];
        while drained < 8 * 4096 {
            let n = unsafe { libc::read(rfd, buf.as_mut_ptr() as *mut _, buf.len()) };
            assert!(n > 0);
            drained += n as usize;
        }
    });

    sched.join();

    let log = log.lock().unwrap();
    let drained = log.iter().position(|e| *e == "d:drain").unwrap();
    let resumed = log.iter().position(|e| *e == "w:resumed").unwrap();
    assert!(
        drained < resumed,
        "the writer must not resume before the drainer made room"
    );

    unsafe {
        libc::close(rfd);
        libc::close(wfd);
    }
}

#[test]
fn reader_sleeps_again_for_every_byte() {
    let (rfd, wfd) = pipe();
    let received = Arc::new(Mutex::new(Vec::new()));
    let mut sched = Scheduler::new();

    let r = received.clone();
    sched.spawn(move || {
        for _ in 0..3 {
            // One check per invocation: re-issue the sleep for each byte.
            sleep_read(rfd);
            let mut byte = [0u8; 1];
            let n = unsafe { libc::read(rfd, byte.as_mut_ptr() as *mut _, 1) };
            assert_eq!(n, 1);
            r.lock().unwrap().push(byte[0]);
        }
    });

    sched.spawn(move || {
        for value in [10u8, 20, 30] {
            let byte = [value];
            let n = unsafe { libc::write(wfd, byte.as_ptr() as *const _, 1) };
            assert_eq!(n, 1);
            yield_now();
        }
    });

    sched.join();
    assert_eq!(*received.lock().unwrap(), vec![10, 20, 30]);

    unsafe {
        libc::close(rfd);
        libc::close(wfd);
    }
}
