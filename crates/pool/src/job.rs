//! Submitted work and its completion handle.

use std::panic::{self, AssertUnwindSafe};

use crossbeam_channel::{bounded, Receiver, TryRecvError};

use metronome_core::panic_message;

/// A unit of work boxed for the queue. The closure owns its completion
/// channel; running it always resolves the paired [`JobHandle`].
pub(crate) type BoxedJob = Box<dyn FnOnce() + Send + 'static>;

/// Failure carried by a [`JobHandle`] in place of a value.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The job panicked; the payload message is preserved.
    #[error("job panicked: {0}")]
    Panicked(String),
    /// The pool shut down before the job could run.
    #[error("pool is shut down")]
    Shutdown,
}

/// Completion handle for a submitted job.
///
/// Resolves exactly once, with the job's return value or the captured
/// failure. Dropping the handle detaches the job; it still runs.
pub struct JobHandle<T> {
    rx: Receiver<Result<T, JobError>>,
}

impl<T> JobHandle<T> {
    /// Block until the job finishes.
    pub fn join(self) -> Result<T, JobError> {
        self.rx.recv().unwrap_or(Err(JobError::Shutdown))
    }

    /// Non-blocking poll. `None` while the job is still pending.
    pub fn try_join(&mut self) -> Option<Result<T, JobError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(JobError::Shutdown)),
        }
    }
}

/// Package a closure into a queueable job plus the handle observing it.
pub(crate) fn package<T, F>(f: F) -> (BoxedJob, JobHandle<T>)
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = bounded(1);
    let job: BoxedJob = Box::new(move || {
        let result = panic::catch_unwind(AssertUnwindSafe(f))
            .map_err(|payload| JobError::Panicked(panic_message(payload.as_ref())));
        let _ = tx.send(result);
    });
    (job, JobHandle { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_resolves_with_value() {
        let (job, handle) = package(|| 21 * 2);
        job();
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn handle_carries_panic_message() {
        let (job, handle) = package(|| -> () { panic!("boom") });
        job();
        match handle.join() {
            Err(JobError::Panicked(message)) => assert_eq!(message, "boom"),
            other => panic!("expected panic error, got {other:?}"),
        }
    }

    #[test]
    fn dropped_job_resolves_as_shutdown() {
        let (job, handle) = package(|| 1);
        drop(job);
        assert!(matches!(handle.join(), Err(JobError::Shutdown)));
    }

    #[test]
    fn try_join_polls_without_blocking() {
        let (job, mut handle) = package(|| "done");
        assert!(handle.try_join().is_none());
        job();
        assert_eq!(handle.try_join().unwrap().unwrap(), "done");
    }
}
