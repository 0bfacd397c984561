//! The adaptive pool: public API plus the state shared with its threads.

mod monitor;
mod worker;

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;
use tracing::{debug, info, warn};

use metronome_core::{PriorityHint, ThreadFactory};

use crate::config::PoolConfig;
use crate::cpu::CpuSampler;
use crate::job::{self, BoxedJob, JobHandle};

/// Errors surfaced while bringing the pool up.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error(transparent)]
    Config(#[from] metronome_core::ConfigError),
    #[error("failed to spawn {role} thread: {source}")]
    Spawn {
        role: &'static str,
        source: io::Error,
    },
}

/// State shared between the pool handle, its workers, and the monitor.
pub(crate) struct Shared {
    pub(crate) config: PoolConfig,
    /// Worker count the pool is converging toward. Written by the
    /// monitor loop and `adjust` only.
    pub(crate) target_size: AtomicUsize,
    /// Worker threads currently alive.
    pub(crate) live_workers: AtomicUsize,
    /// Workers currently executing a job.
    pub(crate) active: AtomicUsize,
    pub(crate) completed: AtomicU64,
    pub(crate) adjustments: AtomicU32,
    /// Epoch millis of the last autoscaling change; 0 = never.
    pub(crate) last_adjust_ms: AtomicU64,
    pub(crate) accepting: AtomicBool,
    pub(crate) jobs_rx: Receiver<BoxedJob>,
    pub(crate) sampler: CpuSampler,
}

impl Shared {
    /// One worker offers to retire because the pool shrank. The live
    /// count is decremented here on success; the caller must exit
    /// without touching it again.
    pub(crate) fn try_retire(&self) -> bool {
        let mut live = self.live_workers.load(Ordering::Acquire);
        loop {
            if live <= self.target_size.load(Ordering::Acquire) {
                return false;
            }
            match self.live_workers.compare_exchange(
                live,
                live - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => live = actual,
            }
        }
    }

    pub(crate) fn record_adjustment(&self) {
        self.adjustments.fetch_add(1, Ordering::Relaxed);
        self.last_adjust_ms
            .store(Utc::now().timestamp_millis() as u64, Ordering::Relaxed);
    }
}

/// Point-in-time view of the pool, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    /// Target worker count.
    pub current_size: usize,
    /// Worker threads alive right now (trails the target briefly after
    /// a shrink).
    pub live_workers: usize,
    /// Workers executing a job.
    pub active: usize,
    pub queue_depth: usize,
    pub completed: u64,
    pub adjustments: u32,
    pub last_adjustment: Option<DateTime<Utc>>,
    /// Fresh CPU estimate, fraction of the whole machine.
    pub cpu: f64,
}

impl std::fmt::Display for PoolSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pool: size {} (live {}, active {}), queue {}, completed {}, adjustments {} (last: {}), cpu {:.1}%",
            self.current_size,
            self.live_workers,
            self.active,
            self.queue_depth,
            self.completed,
            self.adjustments,
            self.last_adjustment
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
            self.cpu * 100.0,
        )
    }
}

/// A bounded, self-resizing worker pool.
///
/// All methods are thread-safe; share the pool behind an `Arc` and call
/// from any thread.
pub struct AdaptiveWorkerPool {
    shared: Arc<Shared>,
    job_tx: Mutex<Option<Sender<BoxedJob>>>,
    worker_factory: Arc<ThreadFactory>,
    worker_handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
    monitor_stop: Mutex<Option<Sender<()>>>,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
}

impl AdaptiveWorkerPool {
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;

        let (job_tx, jobs_rx) = bounded(config.queue_capacity);
        let initial = config.initial_size;
        let shared = Arc::new(Shared {
            config,
            target_size: AtomicUsize::new(initial),
            live_workers: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            adjustments: AtomicU32::new(0),
            last_adjust_ms: AtomicU64::new(0),
            accepting: AtomicBool::new(true),
            jobs_rx,
            sampler: CpuSampler::new(),
        });

        let worker_factory = Arc::new(ThreadFactory::new("pool-worker", PriorityHint::Normal));
        let worker_handles = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..initial {
            spawn_worker(&shared, &worker_factory, &worker_handles)?;
        }

        let (stop_tx, stop_rx) = bounded(0);
        let monitor_factory = ThreadFactory::new("pool-monitor", PriorityHint::Low);
        let monitor_shared = Arc::clone(&shared);
        let monitor_worker_factory = Arc::clone(&worker_factory);
        let monitor_worker_handles = Arc::clone(&worker_handles);
        let monitor_handle = monitor_factory
            .spawn(move || {
                monitor::monitor_loop(
                    monitor_shared,
                    stop_rx,
                    monitor_worker_factory,
                    monitor_worker_handles,
                )
            })
            .map_err(|source| PoolError::Spawn {
                role: "monitor",
                source,
            })?;

        info!(
            workers = initial,
            queue_capacity = shared.config.queue_capacity,
            "adaptive worker pool started"
        );

        Ok(Self {
            shared,
            job_tx: Mutex::new(Some(job_tx)),
            worker_factory,
            worker_handles,
            monitor_stop: Mutex::new(Some(stop_tx)),
            monitor_handle: Mutex::new(Some(monitor_handle)),
        })
    }

    /// Enqueue work for asynchronous execution and return its handle.
    ///
    /// Never blocks, with one deliberate exception: when the queue is at
    /// capacity the job runs synchronously on the calling thread, so a
    /// saturated pool throttles its producers instead of dropping work.
    pub fn submit<T, F>(&self, f: F) -> JobHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (job, handle) = job::package(f);
        self.dispatch(job);
        handle
    }

    /// Fire-and-forget variant of [`submit`](Self::submit); failures are
    /// logged and otherwise dropped.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let job: BoxedJob = Box::new(move || {
            if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
                tracing::error!(
                    panic = %metronome_core::panic_message(payload.as_ref()),
                    "background job panicked"
                );
            }
        });
        self.dispatch(job);
    }

    fn dispatch(&self, job: BoxedJob) {
        if !self.shared.accepting.load(Ordering::Acquire) {
            warn!("job rejected: pool is shut down");
            return;
        }
        let guard = match self.job_tx.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        let Some(tx) = guard.as_ref() else {
            warn!("job rejected: pool is shut down");
            return;
        };
        match tx.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                drop(guard);
                debug!("work queue full; running job on the submitting thread");
                job();
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("job rejected: pool is shut down");
            }
        }
    }

    /// Manually override the target worker count. Rejected with `false`
    /// when outside `[min_size, max_size]`; the pool is unchanged.
    pub fn adjust(&self, new_size: usize) -> bool {
        let config = &self.shared.config;
        if new_size < config.min_size || new_size > config.max_size {
            return false;
        }
        let previous = self.shared.target_size.swap(new_size, Ordering::AcqRel);
        self.ensure_workers();
        info!(previous, new_size, "pool size adjusted manually");
        true
    }

    /// Spawn workers until the live count reaches the target. Shrinking
    /// is handled by the workers themselves via [`Shared::try_retire`].
    fn ensure_workers(&self) {
        while self.shared.accepting.load(Ordering::Acquire)
            && self.shared.live_workers.load(Ordering::Acquire)
                < self.shared.target_size.load(Ordering::Acquire)
        {
            if let Err(error) = spawn_worker(&self.shared, &self.worker_factory, &self.worker_handles)
            {
                tracing::error!(%error, "failed to spawn worker");
                break;
            }
        }
    }

    pub fn status(&self) -> PoolSnapshot {
        let last_ms = self.shared.last_adjust_ms.load(Ordering::Relaxed);
        PoolSnapshot {
            current_size: self.shared.target_size.load(Ordering::Acquire),
            live_workers: self.shared.live_workers.load(Ordering::Acquire),
            active: self.shared.active.load(Ordering::Acquire),
            queue_depth: self.shared.jobs_rx.len(),
            completed: self.shared.completed.load(Ordering::Relaxed),
            adjustments: self.shared.adjustments.load(Ordering::Relaxed),
            last_adjustment: (last_ms > 0)
                .then(|| Utc.timestamp_millis_opt(last_ms as i64).single())
                .flatten(),
            cpu: self.shared.sampler.sample(),
        }
    }

    /// Stop accepting work, drain what is queued within the grace
    /// period, then stop the workers and the monitor. Idempotent.
    ///
    /// When the grace period elapses with work still outstanding the
    /// remaining workers are detached rather than joined; in-flight jobs
    /// are never interrupted.
    pub fn shutdown(&self) {
        if !self.shared.accepting.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("worker pool shutdown requested");

        if let Ok(mut stop) = self.monitor_stop.lock() {
            stop.take();
        }
        if let Ok(mut handle) = self.monitor_handle.lock() {
            if let Some(handle) = handle.take() {
                let _ = handle.join();
            }
        }

        let deadline = Instant::now() + self.shared.config.shutdown_grace();
        while (self.shared.jobs_rx.len() > 0 || self.shared.active.load(Ordering::Acquire) > 0)
            && Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(20));
        }
        let leftover = self.shared.jobs_rx.len();
        let still_active = self.shared.active.load(Ordering::Acquire);

        // Close the intake; workers exit once the queue is empty.
        if let Ok(mut tx) = self.job_tx.lock() {
            tx.take();
        }

        if leftover == 0 && still_active == 0 {
            let handles: Vec<_> = match self.worker_handles.lock() {
                Ok(mut handles) => handles.drain(..).collect(),
                Err(_) => Vec::new(),
            };
            for handle in handles {
                let _ = handle.join();
            }
            info!("worker pool drained and stopped");
        } else {
            warn!(
                leftover,
                still_active, "shutdown grace elapsed with work outstanding; detaching workers"
            );
        }
    }
}

/// Start one worker thread pulling from the shared queue.
pub(crate) fn spawn_worker(
    shared: &Arc<Shared>,
    factory: &ThreadFactory,
    handles: &Mutex<Vec<JoinHandle<()>>>,
) -> Result<(), PoolError> {
    shared.live_workers.fetch_add(1, Ordering::AcqRel);
    let worker_shared = Arc::clone(shared);
    match factory.spawn(move || worker::worker_loop(worker_shared)) {
        Ok(handle) => {
            if let Ok(mut handles) = handles.lock() {
                handles.push(handle);
            }
            Ok(())
        }
        Err(source) => {
            shared.live_workers.fetch_sub(1, Ordering::AcqRel);
            Err(PoolError::Spawn {
                role: "worker",
                source,
            })
        }
    }
}
