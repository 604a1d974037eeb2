mod common;

use kairos::task::Step;
use kairos::time::{instrumented, sleep, sleep_for, sleep_ms};
use kairos::{Scheduler, SchedulerBuilder, Task, TaskError, yield_now};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_sleep_waits_at_least_duration() {
    common::init_tracing();

    let scheduler = Scheduler::start().unwrap();
    let handle = scheduler.handle();

    let mut task = Task::new(async move {
        let start = Instant::now();
        sleep_for(&handle, Duration::from_millis(50)).await;
        Ok(start.elapsed())
    });

    let elapsed = task.get_result().unwrap();

    assert!(
        elapsed >= Duration::from_millis(50),
        "Sleep should wait at least the specified duration"
    );
}

#[test]
fn test_sequential_sleeps_add_up() {
    common::init_tracing();

    let scheduler = Scheduler::start().unwrap();
    let handle = scheduler.handle();

    let start = Instant::now();
    let mut task = Task::new(async move {
        for _ in 0..3 {
            handle.sleep_for(Duration::from_millis(30)).await;
        }
        Ok(())
    });

    task.get_result().unwrap();

    assert!(start.elapsed() >= Duration::from_millis(90));
}

#[test]
fn test_zero_duration_never_suspends() {
    let scheduler = Scheduler::start().unwrap();
    let handle = scheduler.handle();
    let observer = handle.clone();

    let mut task = Task::new(async move {
        handle.sleep_for(Duration::ZERO).await;
        sleep(&handle, 0).await?;
        Ok(())
    });

    assert_eq!(task.resume().unwrap(), Step::Completed);
    assert_eq!(observer.pending(), 0);
    assert_eq!(scheduler.shutdown().delivered, 0);
}

#[test]
fn test_sleep_ms_task() {
    let scheduler = Scheduler::start().unwrap();
    let handle = scheduler.handle();

    let start = Instant::now();
    let mut task = sleep_ms(&handle, 25);

    task.get_result().unwrap();

    assert!(start.elapsed() >= Duration::from_millis(25));
}

#[test]
fn test_body_resumes_on_scheduler_thread() {
    let scheduler = SchedulerBuilder::new()
        .thread_name("sleep-test-timers")
        .build()
        .unwrap();
    let handle = scheduler.handle();

    let mut task = Task::new(async move {
        let before = thread::current().name().map(String::from);
        handle.sleep_for(Duration::from_millis(5)).await;
        let after = thread::current().name().map(String::from);
        Ok((before, after))
    });

    let (before, after) = task.get_result().unwrap();

    assert_ne!(before.as_deref(), Some("sleep-test-timers"));
    assert_eq!(after.as_deref(), Some("sleep-test-timers"));
}

#[test]
fn test_sleep_on_closed_scheduler_panics_inside_task() {
    let scheduler = Scheduler::start().unwrap();
    let handle = scheduler.handle();
    scheduler.shutdown();

    let mut task = Task::new(async move {
        handle.sleep_for(Duration::from_millis(5)).await;
        Ok(())
    });

    match task.get_result() {
        Err(TaskError::Panicked(message)) => {
            assert!(message.contains("sleep could not be registered"), "{message}");
        }
        other => panic!("expected a captured panic, got {other:?}"),
    }
}

#[test]
fn test_instrumented_measures_from_first_poll() {
    let scheduler = Scheduler::start().unwrap();
    let handle = scheduler.handle();

    let measured = instrumented(handle.sleep_for(Duration::from_millis(40)));
    thread::sleep(Duration::from_millis(40));

    let mut task = Task::new(async move {
        let ((), elapsed) = measured.await;
        Ok(elapsed)
    });

    let elapsed = task.get_result().unwrap();

    assert!(elapsed >= Duration::from_millis(40));
    assert!(
        elapsed < Duration::from_millis(75),
        "Clock should start on first poll, not at construction"
    );
}

#[test]
fn test_yield_now_resumes_same_frame() {
    let mut task = Task::new(async {
        let mut turns = 0;
        for _ in 0..3 {
            yield_now().await;
            turns += 1;
        }
        Ok(turns)
    });

    assert_eq!(task.resume().unwrap(), Step::Completed);
    assert_eq!(task.get_result().unwrap(), 3);
}
