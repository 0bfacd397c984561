use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::SchedulerConfig;
use crate::runner::UnifiedScheduler;
use crate::task::TaskKind;

fn quick_config() -> SchedulerConfig {
    SchedulerConfig {
        pool_size: 2,
        max_concurrent_tasks: 3,
        shutdown_grace_ms: 1_000,
    }
}

fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// A counting task plus its shared counter.
fn counting_task() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let counter = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&counter);
    (counter, move || {
        seen.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn periodic_task_fires_repeatedly() {
    let scheduler = UnifiedScheduler::new(quick_config()).unwrap();
    let (count, task) = counting_task();

    let id = scheduler
        .schedule(TaskKind::Monitor, task, Duration::ZERO, Duration::from_millis(20))
        .unwrap();
    assert!(id.starts_with("monitor-"));

    assert!(wait_until(
        || count.load(Ordering::SeqCst) >= 3,
        Duration::from_secs(2)
    ));
    scheduler.shutdown();
}

#[test]
fn initial_delay_is_honored() {
    let scheduler = UnifiedScheduler::new(quick_config()).unwrap();
    let (count, task) = counting_task();

    scheduler
        .schedule(
            TaskKind::Batch,
            task,
            Duration::from_millis(300),
            Duration::from_millis(50),
        )
        .unwrap();

    thread::sleep(Duration::from_millis(100));
    assert_eq!(count.load(Ordering::SeqCst), 0, "fired before its delay");

    assert!(wait_until(
        || count.load(Ordering::SeqCst) >= 1,
        Duration::from_secs(2)
    ));
    scheduler.shutdown();
}

#[test]
fn registry_capacity_is_a_soft_rejection() {
    let scheduler = UnifiedScheduler::new(quick_config()).unwrap();
    let (count, task) = counting_task();
    let period = Duration::from_millis(25);

    let ids: Vec<_> = (0..3)
        .map(|_| {
            scheduler
                .schedule(TaskKind::Monitor, || {}, Duration::ZERO, period)
                .expect("registration under the cap must succeed")
        })
        .collect();

    // The cap is reached: the next registration is rejected softly.
    assert!(scheduler
        .schedule(TaskKind::Cleanup, task, Duration::ZERO, period)
        .is_none());
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.status().active_tasks, 3);
    assert!(!scheduler.is_healthy());

    // Canceling one frees a slot.
    assert!(scheduler.cancel(&ids[0]));
    assert!(scheduler
        .schedule(TaskKind::Cleanup, || {}, Duration::ZERO, period)
        .is_some());
    scheduler.shutdown();
}

#[test]
fn cancel_is_idempotent() {
    let scheduler = UnifiedScheduler::new(quick_config()).unwrap();
    let id = scheduler
        .schedule(TaskKind::Cleanup, || {}, Duration::ZERO, Duration::from_millis(50))
        .unwrap();

    assert!(scheduler.cancel(&id));
    assert!(!scheduler.cancel(&id));
    assert!(!scheduler.cancel("cleanup-unknown"));
    scheduler.shutdown();
}

#[test]
fn canceled_task_never_fires_again() {
    let scheduler = UnifiedScheduler::new(quick_config()).unwrap();
    let (count, task) = counting_task();
    let period = Duration::from_millis(25);

    let id = scheduler
        .schedule(TaskKind::Monitor, task, Duration::ZERO, period)
        .unwrap();
    assert!(wait_until(
        || count.load(Ordering::SeqCst) >= 1,
        Duration::from_secs(2)
    ));

    assert!(scheduler.cancel(&id));
    // Let any invocation that was already in flight finish first.
    thread::sleep(Duration::from_millis(50));
    let after_cancel = count.load(Ordering::SeqCst);

    // Watch over several periods: the count must not move.
    thread::sleep(period * 8);
    assert_eq!(count.load(Ordering::SeqCst), after_cancel);
    scheduler.shutdown();
}

#[test]
fn panicking_task_keeps_its_schedule_and_its_siblings() {
    let scheduler = UnifiedScheduler::new(quick_config()).unwrap();
    let (bad_count, _) = counting_task();
    let (good_count, good_task) = counting_task();

    let bad_seen = Arc::clone(&bad_count);
    scheduler
        .schedule(
            TaskKind::Batch,
            move || {
                bad_seen.fetch_add(1, Ordering::SeqCst);
                panic!("task failure");
            },
            Duration::ZERO,
            Duration::from_millis(20),
        )
        .unwrap();
    scheduler
        .schedule(TaskKind::Monitor, good_task, Duration::ZERO, Duration::from_millis(20))
        .unwrap();

    // The panicking task keeps firing, and so does its sibling.
    assert!(wait_until(
        || bad_count.load(Ordering::SeqCst) >= 2 && good_count.load(Ordering::SeqCst) >= 2,
        Duration::from_secs(2)
    ));

    // Status stays consistent under failing tasks.
    let status = scheduler.status();
    assert_eq!(status.active_tasks, 2);
    assert!(status.total_dispatched >= 4);
    scheduler.shutdown();
}

#[test]
fn run_once_executes_exactly_once() {
    let scheduler = UnifiedScheduler::new(quick_config()).unwrap();
    let (count, _) = counting_task();

    let seen = Arc::clone(&count);
    scheduler.run_once(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    assert!(wait_until(
        || count.load(Ordering::SeqCst) == 1,
        Duration::from_secs(2)
    ));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(count.load(Ordering::SeqCst), 1);
    scheduler.shutdown();
}

#[test]
fn zero_period_is_rejected() {
    let scheduler = UnifiedScheduler::new(quick_config()).unwrap();
    assert!(scheduler
        .schedule(TaskKind::Monitor, || {}, Duration::ZERO, Duration::ZERO)
        .is_none());
    scheduler.shutdown();
}

#[test]
fn shutdown_cancels_everything_and_rejects_new_work() {
    let scheduler = UnifiedScheduler::new(quick_config()).unwrap();
    let (count, task) = counting_task();

    scheduler
        .schedule(TaskKind::Monitor, task, Duration::ZERO, Duration::from_millis(20))
        .unwrap();
    assert!(wait_until(
        || count.load(Ordering::SeqCst) >= 1,
        Duration::from_secs(2)
    ));

    scheduler.shutdown();
    let after_shutdown = count.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150));
    assert_eq!(count.load(Ordering::SeqCst), after_shutdown);

    assert!(scheduler
        .schedule(TaskKind::Monitor, || {}, Duration::ZERO, Duration::from_millis(20))
        .is_none());
    assert!(!scheduler.is_healthy());
    assert_eq!(scheduler.status().active_tasks, 0);

    // Second shutdown is a no-op.
    scheduler.shutdown();
}
