//! Progress reporting and cooperative cancellation

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Receives progress from long running passes. Every method takes `&self` so
/// a single handler can be shared between rayon workers.
pub trait WaitingHandler: Sync {
    fn reset_progress(&self);

    fn set_max(&self, max: usize);

    fn increment(&self);

    fn increment_by(&self, n: usize) {
        for _ in 0..n {
            self.increment();
        }
    }

    fn is_cancelled(&self) -> bool;
}

/// Atomic [`WaitingHandler`] that logs every 10% of progress
#[derive(Debug, Default)]
pub struct ProgressCounter {
    label: String,
    max: AtomicUsize,
    progress: AtomicUsize,
    logged: AtomicUsize,
    cancelled: AtomicBool,
}

impl ProgressCounter {
    pub fn new<S: Into<String>>(label: S) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn progress(&self) -> usize {
        self.progress.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::Relaxed)
    }

    fn report(&self, progress: usize) {
        let max = self.max();
        if max == 0 || self.label.is_empty() {
            return;
        }
        let decile = (progress.min(max) * 10 / max) * 10;
        if self.logged.fetch_max(decile, Ordering::Relaxed) < decile {
            log::info!("{}: {}%", self.label, decile);
        }
    }
}

impl WaitingHandler for ProgressCounter {
    fn reset_progress(&self) {
        self.progress.store(0, Ordering::Relaxed);
        self.logged.store(0, Ordering::Relaxed);
    }

    fn set_max(&self, max: usize) {
        self.max.store(max, Ordering::Relaxed);
    }

    fn increment(&self) {
        self.increment_by(1);
    }

    fn increment_by(&self, n: usize) {
        let progress = self.progress.fetch_add(n, Ordering::Relaxed) + n;
        self.report(progress);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
