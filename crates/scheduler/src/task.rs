//! Task categories and the per-invocation instrumentation wrapper.

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use metronome_core::panic_message;

/// Category of work registered with the scheduler. Drives the task-id
/// prefix and the log context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Low-frequency housekeeping (cache eviction, registry sweeps).
    Cleanup,
    /// Recurring health and status checks.
    Monitor,
    /// Periodic bulk work.
    Batch,
}

impl TaskKind {
    pub fn prefix(self) -> &'static str {
        match self {
            TaskKind::Cleanup => "cleanup",
            TaskKind::Monitor => "monitor",
            TaskKind::Batch => "batch",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskKind::Cleanup => "cleanup task",
            TaskKind::Monitor => "monitor task",
            TaskKind::Batch => "batch task",
        }
    }
}

/// Invocations slower than this get a starvation warning: a handful of
/// executor threads serve every periodic task in the process, so one
/// slow task delays all of them.
pub(crate) const SLOW_TASK_THRESHOLD: Duration = Duration::from_secs(1);

/// Run one invocation under the standard wrapper.
///
/// A panic is caught and logged, never propagated — a failing task must
/// not cancel itself or its siblings. Wall-clock duration above
/// [`SLOW_TASK_THRESHOLD`] logs a warning.
pub(crate) fn run_instrumented(kind: TaskKind, id: &str, f: impl FnOnce()) {
    let start = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    let elapsed = start.elapsed();

    if let Err(payload) = result {
        error!(
            task = id,
            panic = %panic_message(payload.as_ref()),
            "{} panicked",
            kind.label()
        );
    }
    if elapsed > SLOW_TASK_THRESHOLD {
        warn!(
            task = id,
            elapsed_ms = elapsed.as_millis() as u64,
            "{} ran over the slow-task threshold",
            kind.label()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn kind_prefixes_are_stable() {
        assert_eq!(TaskKind::Cleanup.prefix(), "cleanup");
        assert_eq!(TaskKind::Monitor.prefix(), "monitor");
        assert_eq!(TaskKind::Batch.prefix(), "batch");
    }

    #[test]
    fn wrapper_contains_panics() {
        let runs = AtomicUsize::new(0);
        run_instrumented(TaskKind::Monitor, "t", || {
            runs.fetch_add(1, Ordering::SeqCst);
            panic!("inner failure");
        });
        // Reaching this line is the assertion: the panic was contained.
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
