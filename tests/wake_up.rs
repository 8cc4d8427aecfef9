use std::sync::{Arc, Mutex};

use strand::{Scheduler, sleep_read, yield_now};

fn pipe() -> (i32, i32) {
    let mut fds = [0i32; 2];
    let res = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(res, 0, "pipe() failed");
    (fds[0], fds[1])
}

#[test]
fn wake_up_resumes_a_sleeper_without_io() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (rfd, wfd) = pipe();
    let resumed = Arc::new(Mutex::new(false));
    let mut sched = Scheduler::new();

    let r = resumed.clone();
    let id = sched.spawn(move || {
        // Nobody ever writes to this pipe; only wake_up can resume us.
        sleep_read(rfd);
        *r.lock().unwrap() = true;
    });

    // Let the task run up to its sleep, then pull it back by hand.
    yield_now();
    assert!(!*resumed.lock().unwrap());

    sched.wake_up(id);
    sched.join();

    assert!(
        *resumed.lock().unwrap(),
        "the sleeper should resume after wake_up even though its fd never fired"
    );

    unsafe {
        libc::close(rfd);
        libc::close(wfd);
    }
}

#[test]
fn a_task_can_wake_another() {
    let (rfd, wfd) = pipe();
    let resumed = Arc::new(Mutex::new(false));
    let mut sched = Scheduler::new();

    let r = resumed.clone();
    let sleeper = sched.spawn(move || {
        sleep_read(rfd);
        *r.lock().unwrap() = true;
    });

    sched.spawn(move || {
        strand::wake_up(sleeper);
    });

    sched.join();
    assert!(*resumed.lock().unwrap());

    unsafe {
        libc::close(rfd);
        libc::close(wfd);
    }
}

#[test]
fn wake_up_targets_the_right_sleeper() {
    let (rfd_a, wfd_a) = pipe();
    let (rfd_b, wfd_b) = pipe();

    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let mut sched = Scheduler::new();

    let l = log.clone();
    sched.spawn(move || {
        l.lock().unwrap().push("a:sleep");
        sleep_read(rfd_a);
        l.lock().unwrap().push("a:resumed");

        let mut byte = [0u8; 1];
        unsafe { libc::read(rfd_a, byte.as_mut_ptr() as *mut _, 1) };
    });

    let l = log.clone();
    let id_b = sched.spawn(move || {
        l.lock().unwrap().push("b:sleep");
        sleep_read(rfd_b);
        l.lock().unwrap().push("b:resumed");
    });

    // Run both tasks up to their sleeps.
    yield_now();
    {
        let log = log.lock().unwrap();
        assert_eq!(*log, vec!["a:sleep", "b:sleep"]);
    }

    // Wake the second sleeper only; the first must stay parked until its
    // pipe actually becomes readable.
    sched.wake_up(id_b);
    yield_now();
    {
        let log = log.lock().unwrap();
        assert_eq!(log.last(), Some(&"b:resumed"));
        assert!(!log.contains(&"a:resumed"));
    }

    let byte = [1u8; 1];
    let n = unsafe { libc::write(wfd_a, byte.as_ptr() as *const _, 1) };
    assert_eq!(n, 1);

    sched.join();

    let log = log.lock().unwrap();
    assert!(log.contains(&"a:resumed"));

    unsafe {
        libc::close(rfd_a);
        libc::close(wfd_a);
        libc::close(rfd_b);
        libc::close(wfd_b);
    }
}
