mod common;

use kairos::task::{Step, TaskState};
use kairos::{Handle, Scheduler, ShutdownPolicy, ShutdownReport, Task, TaskError};
use parking_lot::Mutex;
use rstest::rstest;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("disk full at level {0}")]
struct DiskFull(u32);

fn level(n: u32, trace: Arc<Mutex<Vec<u32>>>) -> Task<u32> {
    Task::new(async move {
        let below = if n > 1 {
            level(n - 1, trace.clone()).await?
        } else {
            0
        };

        trace.lock().push(n);
        Ok(below * 10 + n)
    })
}

fn failing_level(n: u32) -> Task<u32> {
    Task::new(async move {
        if n == 1 {
            return Err(anyhow::Error::new(DiskFull(1)));
        }

        let below = failing_level(n - 1).await?;
        Ok(below + n)
    })
}

fn explode() -> u32 {
    panic!("boom")
}

fn compute(x: i64) -> anyhow::Result<i64> {
    if x < 0 {
        anyhow::bail!("negative input {x}");
    }

    Ok(x * 2 + 10)
}

#[rstest]
#[case::scenario(7, Ok(24))]
#[case::zero(0, Ok(10))]
#[case::error(-3, Err("negative input -3"))]
fn test_get_result_matches_direct_call(#[case] input: i64, #[case] expected: Result<i64, &str>) {
    let direct = compute(input).map_err(|e| e.to_string());
    let mut task = Task::new(async move { compute(input) });
    let observed = task.get_result().map_err(|e| e.to_string());

    assert_eq!(observed, direct);
    assert_eq!(observed, expected.map_err(String::from));
}

#[test]
fn test_task_is_lazy() {
    common::init_tracing();

    let started = Arc::new(AtomicBool::new(false));
    let flag = started.clone();

    let mut task = Task::new(async move {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    });

    assert!(!started.load(Ordering::SeqCst), "Creating a task must not run it");
    assert_eq!(task.state(), TaskState::Created);
    assert!(!task.is_done());

    assert_eq!(task.resume().unwrap(), Step::Completed);
    assert!(started.load(Ordering::SeqCst));
    assert_eq!(task.state(), TaskState::Completed);
}

#[test]
fn test_chained_levels_complete_inside_out() {
    common::init_tracing();

    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut task = level(5, trace.clone());

    assert_eq!(task.get_result().unwrap(), 12345);
    assert_eq!(*trace.lock(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_error_propagates_unchanged_through_chain() {
    common::init_tracing();

    let mut task = failing_level(6);

    let err = task.get_result().unwrap_err();
    let body = err.body_error().expect("expected a body error");

    assert_eq!(body.downcast_ref::<DiskFull>(), Some(&DiskFull(1)));
    assert_eq!(err.to_string(), "disk full at level 1");
    assert!(!err.is_protocol_violation());
}

#[test]
fn test_take_leaves_empty_handle() {
    let mut original = Task::new(async { Ok("moved") });
    let mut moved = original.take();

    assert!(original.is_empty());
    assert_eq!(original.state(), TaskState::Empty);
    assert_eq!(original.id(), None);
    assert!(matches!(original.resume(), Err(TaskError::Empty)));
    assert!(matches!(original.get_result(), Err(TaskError::Empty)));

    assert!(moved.id().is_some());
    assert_eq!(moved.get_result().unwrap(), "moved");
}

#[test]
fn test_default_handle_is_empty() {
    let mut task = Task::<u8>::default();

    assert!(task.is_empty());
    assert!(!task.is_done());
    assert!(matches!(task.step(), Err(TaskError::Empty)));
}

#[test]
fn test_resume_after_completion_is_rejected() {
    let mut task = Task::new(async { Ok(1) });

    assert_eq!(task.resume().unwrap(), Step::Completed);

    let err = task.resume().unwrap_err();
    assert!(matches!(err, TaskError::AlreadyCompleted));
    assert!(err.is_protocol_violation());
}

#[test]
fn test_result_is_consumed_once() {
    let mut task = Task::new(async { Ok(String::from("once")) });

    assert_eq!(task.get_result().unwrap(), "once");
    assert!(matches!(task.get_result(), Err(TaskError::Consumed)));
}

#[test]
fn test_panic_is_captured() {
    common::init_tracing();

    let mut task = Task::new(async { Ok(explode()) });

    match task.get_result() {
        Err(TaskError::Panicked(message)) => assert_eq!(message, "boom"),
        other => panic!("expected a captured panic, got {other:?}"),
    }

    assert!(task.is_done());
}

#[test]
fn test_awaiting_empty_child_fails_parent() {
    let mut task = Task::new(async {
        let child = Task::<u8>::default();
        child.await
    });

    let err = task.get_result().unwrap_err();
    let inner = err.body_error().and_then(|e| e.downcast_ref::<TaskError>());

    assert!(matches!(inner, Some(TaskError::Empty)));
}

#[test]
fn test_resume_reports_suspension() {
    common::init_tracing();

    let scheduler = Scheduler::start().unwrap();
    let handle = scheduler.handle();

    let mut task = Task::new(async move {
        handle.sleep_for(Duration::from_millis(20)).await;
        Ok(7)
    });

    assert_eq!(task.resume().unwrap(), Step::Suspended);
    assert_eq!(task.state(), TaskState::Suspended);
    assert!(!task.is_done());

    assert_eq!(task.get_result().unwrap(), 7);
}

#[test]
fn test_child_runs_only_when_awaited() {
    let polled = Arc::new(AtomicUsize::new(0));
    let counter = polled.clone();

    let child = Task::new(async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(2)
    });

    let seen = polled.clone();
    let mut parent = Task::new(async move {
        assert_eq!(seen.load(Ordering::SeqCst), 0, "Child ran before being awaited");
        let value = child.await?;
        Ok(value * 21)
    });

    assert_eq!(parent.get_result().unwrap(), 42);
    assert_eq!(polled.load(Ordering::SeqCst), 1);
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_dropping_suspended_task_releases_body() {
    common::init_tracing();

    let scheduler = Scheduler::builder()
        .shutdown_policy(ShutdownPolicy::Discard)
        .build()
        .unwrap();
    let handle = scheduler.handle();

    let released = Arc::new(AtomicBool::new(false));
    let guard = DropFlag(released.clone());

    let mut task = Task::new(async move {
        let _guard = guard;
        handle.sleep_for(Duration::from_secs(3600)).await;
        Ok(())
    });

    assert_eq!(task.resume().unwrap(), Step::Suspended);
    drop(task);

    assert!(released.load(Ordering::SeqCst), "Body must be dropped with its handle");

    let report = scheduler.shutdown();

    assert_eq!(report.dropped, 0, "A cancelled timer is not reported as dropped");
}

#[test]
fn test_dropped_sleeper_does_not_hold_up_drain() {
    common::init_tracing();

    let scheduler = Scheduler::start().unwrap();
    let handle = scheduler.handle();
    let observer = scheduler.handle();

    let resumed = Arc::new(AtomicBool::new(false));
    let after_sleep = resumed.clone();

    let mut task = Task::new(async move {
        handle.sleep_for(Duration::from_secs(3)).await;
        after_sleep.store(true, Ordering::SeqCst);
        Ok(())
    });

    assert_eq!(task.resume().unwrap(), Step::Suspended);
    drop(task);

    let deadline = Instant::now() + Duration::from_secs(1);
    while observer.pending() > 0 {
        assert!(Instant::now() < deadline, "cancelled timer was not pruned");
        thread::sleep(Duration::from_millis(1));
    }

    let start = Instant::now();
    let report = scheduler.shutdown();

    assert!(
        start.elapsed() < Duration::from_millis(500),
        "shutdown waited {:?} for an abandoned frame",
        start.elapsed()
    );
    assert_eq!(report, ShutdownReport { delivered: 0, dropped: 0 });
    assert!(!resumed.load(Ordering::SeqCst));
}

fn deep(n: u32, handle: Handle) -> Task<u32> {
    Task::new(async move {
        if n == 0 {
            handle.sleep_for(Duration::from_millis(5)).await;
            return Ok(0);
        }

        Ok(deep(n - 1, handle).await? + 1)
    })
}

#[rstest]
#[case::resumed_by_timer(5_000)]
#[case::very_deep(20_000)]
fn test_deep_await_chain_runs_in_constant_stack(#[case] depth: u32) {
    common::init_tracing();

    let scheduler = Scheduler::start().unwrap();
    let mut task = deep(depth, scheduler.handle());

    assert_eq!(task.get_result().unwrap(), depth);
    assert_eq!(scheduler.shutdown().delivered, 1);
}

#[test]
fn test_task_ids_are_unique() {
    let a = Task::new(async { Ok(()) });
    let b = Task::new(async { Ok(()) });

    assert_ne!(a.id(), b.id());
}
