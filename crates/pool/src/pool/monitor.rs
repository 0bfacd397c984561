//! The autoscaling loop.
//!
//! A single low-priority thread wakes once per adjustment interval,
//! samples CPU and queue depth, and applies at most one single-step
//! size change. The one-step hysteresis keeps the pool from
//! oscillating; the shrink branch is checked first so the two guards
//! can never both fire in one cycle.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{select, tick, Receiver};
use tracing::{debug, error, info};

use metronome_core::ThreadFactory;

use crate::config::PoolConfig;

use super::{spawn_worker, Shared};

/// A single autoscaling step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Adjustment {
    ShrinkTo(usize),
    GrowTo(usize),
}

/// Decide the step for one cycle, if any.
///
/// High CPU sheds a worker (down to `min_size`); low CPU with queue
/// backlog adds one (up to `max_size`). Anything else is a no-op.
pub(crate) fn plan_adjustment(
    cpu: f64,
    queue_depth: usize,
    current: usize,
    config: &PoolConfig,
) -> Option<Adjustment> {
    if cpu > config.high_cpu_threshold && current > config.min_size {
        Some(Adjustment::ShrinkTo(current - 1))
    } else if cpu < config.low_cpu_threshold
        && queue_depth > config.high_queue_threshold
        && current < config.max_size
    {
        Some(Adjustment::GrowTo(current + 1))
    } else {
        None
    }
}

pub(super) fn monitor_loop(
    shared: Arc<Shared>,
    stop: Receiver<()>,
    factory: Arc<ThreadFactory>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
) {
    let ticker = tick(shared.config.adjust_interval());
    loop {
        select! {
            recv(stop) -> _ => break,
            recv(ticker) -> _ => run_cycle(&shared, &factory, &handles),
        }
    }
    debug!("pool monitor stopped");
}

fn run_cycle(shared: &Arc<Shared>, factory: &ThreadFactory, handles: &Mutex<Vec<JoinHandle<()>>>) {
    let cpu = shared.sampler.sample();
    let queue_depth = shared.jobs_rx.len();
    let current = shared.target_size.load(Ordering::Acquire);

    match plan_adjustment(cpu, queue_depth, current, &shared.config) {
        Some(Adjustment::ShrinkTo(to)) => {
            shared.target_size.store(to, Ordering::Release);
            shared.record_adjustment();
            info!(
                "high CPU ({:.1}%), shedding a worker: {} -> {}",
                cpu * 100.0,
                current,
                to
            );
        }
        Some(Adjustment::GrowTo(to)) => {
            shared.target_size.store(to, Ordering::Release);
            if let Err(err) = spawn_worker(shared, factory, handles) {
                // Roll the target back; the next cycle retries.
                shared.target_size.store(current, Ordering::Release);
                error!(error = %err, "failed to grow pool, keeping current size");
                return;
            }
            shared.record_adjustment();
            info!(
                "queue backlog ({}) with idle CPU ({:.1}%), adding a worker: {} -> {}",
                queue_depth,
                cpu * 100.0,
                current,
                to
            );
        }
        None => {}
    }
}
