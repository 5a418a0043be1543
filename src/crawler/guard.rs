use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Single-flight lock for crawl cycles.
#[derive(Debug, Default)]
pub struct RunGuard {
    running: AtomicBool,
}

/// Proof that the holder owns the guard. Dropping it releases the guard.
#[derive(Debug)]
#[must_use = "the guard is released as soon as the permit is dropped"]
pub struct RunPermit {
    guard: Arc<RunGuard>,
}

impl RunGuard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns `None` immediately when another cycle holds the guard.
    pub fn try_acquire(self: &Arc<Self>) -> Option<RunPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                guard: Arc::clone(self),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}
