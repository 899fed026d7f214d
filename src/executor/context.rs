//! Explicit per-run state. The engine carries no process-wide globals; every
//! piece of shared run state travels through a [`RunContext`].

use crate::error::RunError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Cooperative cancellation flag, checked at batch boundaries and before
/// each sink postprocess. Clearing it requests an early return at the next
/// safe checkpoint, never mid-item.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// `(current, total)` progress counters, shared with whoever reports to the
/// user.
#[derive(Debug, Default)]
pub struct Progress {
    current: AtomicUsize,
    total: AtomicUsize,
}

impl Progress {
    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
    }

    pub fn advance(&self, n: usize) {
        self.current.fetch_add(n, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> (usize, usize) {
        (
            self.current.load(Ordering::SeqCst),
            self.total.load(Ordering::SeqCst),
        )
    }
}

/// Everything a single pipeline run needs to know about itself.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub cancel: CancelToken,
    pub progress: Arc<Progress>,
    /// Restricted single-item execution for interactive feedback.
    pub preview_mode: bool,
    /// Items pulled from each source per graph pass.
    pub batch_size: usize,
    /// Seed for the per-run RNG; conditional routing is reproducible under a
    /// fixed seed.
    pub seed: u64,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            cancel: CancelToken::new(),
            progress: Arc::new(Progress::default()),
            preview_mode: false,
            batch_size: 50,
            seed: 0,
        }
    }
}

/// Only one pipeline run may execute at a time. A second start attempt is
/// rejected, not queued.
#[derive(Debug, Clone, Default)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Claims the flag for the duration of the returned guard.
    pub fn try_acquire(&self) -> Result<RunGuard, RunError> {
        if self
            .0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RunError::AlreadyRunning);
        }
        Ok(RunGuard(self.0.clone()))
    }
}

/// RAII release of the running flag.
pub struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
