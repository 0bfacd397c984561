//! The single timer thread.
//!
//! Owns all due-time bookkeeping: computes the earliest deadline across
//! the registry, sleeps toward it (woken early by new registrations),
//! and hands due invocations to the executor pool.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, Sender};
use tracing::debug;

use crate::task;

use super::{ExecutorJob, RegisteredTask, Shared};

/// Upper bound on one timer sleep, so an empty registry still polls
/// the stop channel at a reasonable rate.
const IDLE_WAIT: Duration = Duration::from_millis(500);

pub(super) fn timer_loop(
    registry: Arc<Mutex<HashMap<String, RegisteredTask>>>,
    job_tx: Sender<ExecutorJob>,
    shared: Arc<Shared>,
    wake: Receiver<()>,
    stop: Receiver<()>,
) {
    loop {
        let wait = next_due_in(&registry).unwrap_or(IDLE_WAIT).min(IDLE_WAIT);
        select! {
            recv(stop) -> _ => break,
            // A wake means a registration changed; loop to re-evaluate
            // deadlines. A disconnect means the scheduler is gone.
            recv(wake) -> msg => {
                if msg.is_err() {
                    break;
                }
            }
            default(wait) => dispatch_due(&registry, &job_tx, &shared),
        }
    }
    debug!("scheduler timer stopped");
}

/// Time until the earliest registered deadline; `None` when the
/// registry is empty.
fn next_due_in(registry: &Mutex<HashMap<String, RegisteredTask>>) -> Option<Duration> {
    let registry = registry.lock().ok()?;
    let now = Instant::now();
    registry
        .values()
        .map(|entry| entry.next_due.saturating_duration_since(now))
        .min()
}

fn dispatch_due(
    registry: &Mutex<HashMap<String, RegisteredTask>>,
    job_tx: &Sender<ExecutorJob>,
    shared: &Shared,
) {
    let now = Instant::now();
    let mut due = Vec::new();

    {
        let Ok(mut registry) = registry.lock() else {
            return;
        };
        for (id, entry) in registry.iter_mut() {
            if entry.next_due > now {
                continue;
            }
            due.push((
                id.clone(),
                entry.kind,
                Arc::clone(&entry.run),
                Arc::clone(&entry.cancelled),
            ));
            // Fixed-rate stepping, but a task lagging more than a full
            // period re-anchors to now instead of bursting to catch up.
            entry.next_due = if now > entry.next_due + entry.period {
                now + entry.period
            } else {
                entry.next_due + entry.period
            };
        }
    }

    for (id, kind, run, cancelled) in due {
        shared.dispatched.fetch_add(1, Ordering::Relaxed);
        let job: ExecutorJob = Box::new(move || {
            if cancelled.load(Ordering::Acquire) {
                return;
            }
            task::run_instrumented(kind, &id, || run());
        });
        if job_tx.send(job).is_err() {
            break;
        }
    }
}
