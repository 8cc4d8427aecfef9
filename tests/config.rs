use strand::{ConfigError, Generator, Scheduler, SchedulerBuilder, yield_value};

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

#[test]
fn builder_defaults_produce_a_working_scheduler() {
    let mut sched = SchedulerBuilder::new().build().unwrap();
    let id = sched.spawn(|| {});
    assert!(id > 0);
    sched.join();
}

#[test]
fn custom_stack_capacity_is_honored() {
    let page = page_size();
    let mut sched = SchedulerBuilder::new()
        .stack_capacity(16 * page)
        .build()
        .unwrap();

    sched.spawn(|| {
        // Deep enough to notice a broken stack, shallow enough for 16 pages.
        fn descend(depth: usize) -> usize {
            if depth == 0 { 0 } else { 1 + descend(depth - 1) }
        }
        assert_eq!(descend(100), 100);
    });

    sched.join();
}

#[test]
fn undersized_stack_capacity_is_rejected() {
    let page = page_size();
    let err = SchedulerBuilder::new()
        .stack_capacity(page)
        .build()
        .unwrap_err();

    assert_eq!(
        err,
        ConfigError::StackTooSmall {
            requested: page,
            minimum: 4 * page,
        }
    );
}

#[test]
fn unaligned_stack_capacity_is_rejected() {
    let page = page_size();
    let err = SchedulerBuilder::new()
        .stack_capacity(8 * page + 1)
        .build()
        .unwrap_err();

    assert_eq!(
        err,
        ConfigError::UnalignedStackCapacity {
            requested: 8 * page + 1,
            page_size: page,
        }
    );
}

#[test]
fn generator_stack_capacity_is_validated_too() {
    let page = page_size();

    let err = Generator::with_stack_capacity(page, |_| {}).unwrap_err();
    assert!(matches!(err, ConfigError::StackTooSmall { .. }));

    let mut g = Generator::with_stack_capacity(16 * page, |limit| {
        for i in 0..limit {
            yield_value(i);
        }
    })
    .unwrap();
    assert_eq!(g.iter_with(3).count(), 3);
}

#[test]
fn handles_format_for_debugging() {
    let sched = Scheduler::new();
    assert_eq!(format!("{sched:?}"), "Scheduler { active: 1, asleep: 0 }");

    let g = Generator::new(|_| {});
    assert_eq!(format!("{g:?}"), "Generator { done: false }");
}

#[test]
#[should_panic(expected = "outside of a scheduler context")]
fn yield_now_requires_a_scheduler() {
    strand::yield_now();
}

#[test]
#[should_panic(expected = "outside of a scheduler context")]
fn spawn_requires_a_scheduler() {
    strand::spawn(|| {});
}

#[test]
#[should_panic(expected = "outside of a scheduler context")]
fn sleep_read_requires_a_scheduler() {
    strand::sleep_read(0);
}

#[test]
#[should_panic(expected = "yield_value() called outside of a generator")]
fn yield_value_requires_a_generator() {
    yield_value(1);
}

#[test]
#[should_panic(expected = "a scheduler is already active on this thread")]
fn one_scheduler_per_thread() {
    let _first = Scheduler::new();
    let _second = Scheduler::new();
}
