//! The scheduler runtime: registry, timer thread, and executor pool.

#[cfg(test)]
mod tests;
mod timer;

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use serde::Serialize;
use tracing::{debug, info, warn};

use metronome_core::{PriorityHint, ThreadFactory};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::task::{self, TaskKind};

/// Errors surfaced while bringing the scheduler up.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Config(#[from] metronome_core::ConfigError),
    #[error("failed to spawn {role} thread: {source}")]
    Spawn {
        role: &'static str,
        source: io::Error,
    },
}

/// A queued invocation handed to the executor pool.
pub(crate) type ExecutorJob = Box<dyn FnOnce() + Send + 'static>;

/// One registered periodic task.
pub(crate) struct RegisteredTask {
    pub(crate) kind: TaskKind,
    pub(crate) run: Arc<dyn Fn() + Send + Sync + 'static>,
    pub(crate) period: Duration,
    pub(crate) next_due: Instant,
    /// Flipped on cancel; checked again at execution start so an
    /// invocation already dispatched never runs after cancellation.
    pub(crate) cancelled: Arc<AtomicBool>,
}

pub(crate) struct Shared {
    pub(crate) running: AtomicBool,
    /// Executor threads currently inside a task.
    pub(crate) active_threads: AtomicUsize,
    /// Invocations handed to the executor pool over the scheduler's
    /// lifetime (periodic and one-shot).
    pub(crate) dispatched: AtomicU64,
}

/// Point-in-time view of the scheduler, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerSnapshot {
    /// Live registry entries.
    pub active_tasks: usize,
    /// Total invocations dispatched so far.
    pub total_dispatched: u64,
    /// Executor thread count.
    pub pool_size: usize,
    /// Executor threads currently inside a task.
    pub active_threads: usize,
}

impl std::fmt::Display for SchedulerSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "scheduler: {} active tasks, {} dispatched, pool {} ({} busy)",
            self.active_tasks, self.total_dispatched, self.pool_size, self.active_threads
        )
    }
}

/// The process-wide periodic-task runner.
///
/// All periodic work in the process shares this scheduler's small
/// low-priority pool, which bounds total timer-thread count and keeps
/// independent subsystems from competing through private timers. All
/// methods are thread-safe.
pub struct UnifiedScheduler {
    config: SchedulerConfig,
    registry: Arc<Mutex<HashMap<String, RegisteredTask>>>,
    shared: Arc<Shared>,
    job_tx: Mutex<Option<Sender<ExecutorJob>>>,
    jobs_rx: Receiver<ExecutorJob>,
    wake_tx: Sender<()>,
    timer_stop: Mutex<Option<Sender<()>>>,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl UnifiedScheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;

        let (job_tx, jobs_rx) = unbounded::<ExecutorJob>();
        let (wake_tx, wake_rx) = bounded(1);
        let (stop_tx, stop_rx) = bounded(0);

        let registry: Arc<Mutex<HashMap<String, RegisteredTask>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            active_threads: AtomicUsize::new(0),
            dispatched: AtomicU64::new(0),
        });

        let worker_factory = ThreadFactory::new("sched-worker", PriorityHint::Low);
        let mut worker_handles = Vec::with_capacity(config.pool_size);
        for _ in 0..config.pool_size {
            let worker_jobs = jobs_rx.clone();
            let worker_shared = Arc::clone(&shared);
            let handle = worker_factory
                .spawn(move || executor_loop(worker_jobs, worker_shared))
                .map_err(|source| SchedulerError::Spawn {
                    role: "executor",
                    source,
                })?;
            worker_handles.push(handle);
        }

        let timer_factory = ThreadFactory::new("sched-timer", PriorityHint::Low);
        let timer_registry = Arc::clone(&registry);
        let timer_shared = Arc::clone(&shared);
        let timer_tx = job_tx.clone();
        let timer_handle = timer_factory
            .spawn(move || timer::timer_loop(timer_registry, timer_tx, timer_shared, wake_rx, stop_rx))
            .map_err(|source| SchedulerError::Spawn {
                role: "timer",
                source,
            })?;

        info!(
            pool_size = config.pool_size,
            max_tasks = config.max_concurrent_tasks,
            "unified scheduler started"
        );

        Ok(Self {
            config,
            registry,
            shared,
            job_tx: Mutex::new(Some(job_tx)),
            jobs_rx,
            wake_tx,
            timer_stop: Mutex::new(Some(stop_tx)),
            timer_handle: Mutex::new(Some(timer_handle)),
            worker_handles: Mutex::new(worker_handles),
        })
    }

    /// Register a periodic task.
    ///
    /// Returns the task id, or `None` when the registry is at capacity
    /// or the period is zero — a soft rejection, never a panic.
    /// Invocations of the same task may overlap if its period elapses
    /// while it runs; tasks needing exclusivity must guard themselves.
    pub fn schedule<F>(
        &self,
        kind: TaskKind,
        task: F,
        initial_delay: Duration,
        period: Duration,
    ) -> Option<String>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if !self.shared.running.load(Ordering::Acquire) {
            warn!("registration rejected: scheduler is shut down");
            return None;
        }
        if period.is_zero() {
            warn!("registration rejected: period must be nonzero");
            return None;
        }

        let Ok(mut registry) = self.registry.lock() else {
            return None;
        };
        if registry.len() >= self.config.max_concurrent_tasks {
            warn!(
                limit = self.config.max_concurrent_tasks,
                "task registry at capacity, rejecting {}",
                kind.label()
            );
            return None;
        }

        let id = format!("{}-{}", kind.prefix(), Uuid::new_v4());
        registry.insert(
            id.clone(),
            RegisteredTask {
                kind,
                run: Arc::new(task),
                period,
                next_due: Instant::now() + initial_delay,
                cancelled: Arc::new(AtomicBool::new(false)),
            },
        );
        // A shutdown that raced this registration has already swept the
        // registry; do not leave an entry it will never see.
        if !self.shared.running.load(Ordering::Acquire) {
            registry.remove(&id);
            return None;
        }
        drop(registry);

        // Nudge the timer so a short initial delay is honored even if
        // it is currently sleeping toward a later deadline.
        let _ = self.wake_tx.try_send(());
        debug!(
            task = %id,
            period_ms = period.as_millis() as u64,
            "scheduled {}",
            kind.label()
        );
        Some(id)
    }

    /// Cancel a task by id. Idempotent: `true` on the first call,
    /// `false` for unknown or already-canceled ids. No future
    /// invocation starts; one already in flight finishes.
    pub fn cancel(&self, id: &str) -> bool {
        let Ok(mut registry) = self.registry.lock() else {
            return false;
        };
        match registry.remove(id) {
            Some(entry) => {
                entry.cancelled.store(true, Ordering::Release);
                debug!(task = id, "task canceled");
                true
            }
            None => false,
        }
    }

    /// Execute a task a single time on the shared executor pool, under
    /// the same instrumentation wrapper as periodic work.
    pub fn run_once<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.shared.running.load(Ordering::Acquire) {
            warn!("one-shot task rejected: scheduler is shut down");
            return;
        }
        let Ok(guard) = self.job_tx.lock() else {
            return;
        };
        let Some(tx) = guard.as_ref() else {
            warn!("one-shot task rejected: scheduler is shut down");
            return;
        };
        self.shared.dispatched.fetch_add(1, Ordering::Relaxed);
        let job: ExecutorJob = Box::new(move || {
            task::run_instrumented(TaskKind::Monitor, "once", task);
        });
        let _ = tx.send(job);
    }

    pub fn status(&self) -> SchedulerSnapshot {
        let active_tasks = self.registry.lock().map(|r| r.len()).unwrap_or(0);
        SchedulerSnapshot {
            active_tasks,
            total_dispatched: self.shared.dispatched.load(Ordering::Relaxed),
            pool_size: self.config.pool_size,
            active_threads: self.shared.active_threads.load(Ordering::Acquire),
        }
    }

    /// Whether the scheduler is live and below its registry cap.
    pub fn is_healthy(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
            && self.registry.lock().map(|r| r.len()).unwrap_or(usize::MAX)
                < self.config.max_concurrent_tasks
    }

    /// Cancel every registered task, stop the timer, and drain the
    /// executor pool within the grace period. Idempotent. On timeout
    /// the executors are detached; in-flight work is not interrupted.
    pub fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("scheduler shutdown requested");

        if let Ok(mut registry) = self.registry.lock() {
            for entry in registry.values() {
                entry.cancelled.store(true, Ordering::Release);
            }
            registry.clear();
        }

        if let Ok(mut stop) = self.timer_stop.lock() {
            stop.take();
        }
        if let Ok(mut handle) = self.timer_handle.lock() {
            if let Some(handle) = handle.take() {
                let _ = handle.join();
            }
        }

        // Close the intake; executors exit once the queue is empty.
        if let Ok(mut tx) = self.job_tx.lock() {
            tx.take();
        }

        let deadline = Instant::now() + self.config.shutdown_grace();
        while (self.jobs_rx.len() > 0 || self.shared.active_threads.load(Ordering::Acquire) > 0)
            && Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(10));
        }

        if self.jobs_rx.len() == 0 && self.shared.active_threads.load(Ordering::Acquire) == 0 {
            let handles: Vec<_> = match self.worker_handles.lock() {
                Ok(mut handles) => handles.drain(..).collect(),
                Err(_) => Vec::new(),
            };
            for handle in handles {
                let _ = handle.join();
            }
            info!("scheduler stopped");
        } else {
            warn!(
                queued = self.jobs_rx.len(),
                active = self.shared.active_threads.load(Ordering::Acquire),
                "shutdown grace elapsed; detaching executor threads"
            );
        }
    }
}

fn executor_loop(jobs: Receiver<ExecutorJob>, shared: Arc<Shared>) {
    while let Ok(job) = jobs.recv() {
        shared.active_threads.fetch_add(1, Ordering::AcqRel);
        job();
        shared.active_threads.fetch_sub(1, Ordering::AcqRel);
    }
    debug!("scheduler executor stopped");
}
