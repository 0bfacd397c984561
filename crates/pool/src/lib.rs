//! Self-tuning worker pool.
//!
//! [`AdaptiveWorkerPool`] executes submitted closures on a bounded set of
//! worker threads. A private low-priority monitor thread periodically
//! samples CPU load and queue depth and nudges the worker count up or
//! down within configured bounds. When the work queue is full, new
//! submissions run synchronously on the submitting thread, throttling
//! producers instead of dropping work.

pub mod config;
pub mod cpu;
pub mod job;
pub mod pool;

pub use config::PoolConfig;
pub use cpu::CpuSampler;
pub use job::{JobError, JobHandle};
pub use pool::{AdaptiveWorkerPool, PoolError, PoolSnapshot};
