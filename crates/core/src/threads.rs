//! Named-thread construction shared by every component.
//!
//! Each worker group builds its threads through a [`ThreadFactory`] so
//! threads stay identifiable in logs and stack dumps, and so the
//! background/priority intent of a group is declared in one place.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{Builder, JoinHandle};

use tracing::debug;

/// Advisory scheduling priority for a worker group.
///
/// The hint expresses intent (monitor and timer threads should yield to
/// real work); the OS scheduler keeps final say.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityHint {
    /// Background work that should stay out of the way of the rest of
    /// the process.
    Low,
    Normal,
}

/// Builds the named threads of one component.
pub struct ThreadFactory {
    prefix: String,
    priority: PriorityHint,
    counter: AtomicUsize,
}

impl ThreadFactory {
    pub fn new(prefix: impl Into<String>, priority: PriorityHint) -> Self {
        Self {
            prefix: prefix.into(),
            priority,
            counter: AtomicUsize::new(0),
        }
    }

    /// Spawn a thread named `{prefix}-{n}` with a monotonically
    /// increasing `n`.
    pub fn spawn<F>(&self, f: F) -> io::Result<JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", self.prefix, n);
        debug!(thread = %name, priority = ?self.priority, "spawning thread");
        Builder::new().name(name).spawn(f)
    }

    pub fn priority(&self) -> PriorityHint {
        self.priority
    }

    /// Total threads spawned through this factory so far.
    pub fn spawned(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threads_are_named_sequentially() {
        let factory = ThreadFactory::new("test-worker", PriorityHint::Normal);

        let first = factory
            .spawn(|| {
                assert_eq!(std::thread::current().name(), Some("test-worker-0"));
            })
            .unwrap();
        let second = factory
            .spawn(|| {
                assert_eq!(std::thread::current().name(), Some("test-worker-1"));
            })
            .unwrap();

        first.join().unwrap();
        second.join().unwrap();
        assert_eq!(factory.spawned(), 2);
    }

    #[test]
    fn priority_hint_is_recorded() {
        let factory = ThreadFactory::new("bg", PriorityHint::Low);
        assert_eq!(factory.priority(), PriorityHint::Low);
    }
}
