use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use tracing::debug;

use super::Shared;

/// How long an idle worker waits on the queue before re-checking
/// whether the pool shrank underneath it.
const RETIRE_CHECK_INTERVAL: Duration = Duration::from_millis(500);

pub(super) fn worker_loop(shared: Arc<Shared>) {
    let jobs = shared.jobs_rx.clone();
    loop {
        if shared.try_retire() {
            debug!("worker retiring after pool shrink");
            return;
        }
        match jobs.recv_timeout(RETIRE_CHECK_INTERVAL) {
            Ok(job) => {
                shared.active.fetch_add(1, Ordering::AcqRel);
                job();
                shared.active.fetch_sub(1, Ordering::AcqRel);
                shared.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                shared.live_workers.fetch_sub(1, Ordering::AcqRel);
                return;
            }
        }
    }
}
