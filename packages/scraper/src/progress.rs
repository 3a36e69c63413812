//! Batch progress reporting.
//!
//! Crawl and scrape loops report their counters through a
//! [`ProgressObserver`] after every batch. The observer decides how to
//! render them: a log line, a terminal progress bar, or nothing at all.

use std::sync::Arc;

/// Counters describing a run after a batch completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    /// Short label for the run, usually the retailer slug.
    pub label: String,
    /// URLs still waiting to be processed.
    pub pending: usize,
    /// URLs processed so far.
    pub processed: usize,
    /// URLs that produced a usable result.
    pub valid: usize,
}

impl std::fmt::Display for BatchProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "From: {} | Pending: {} | Processed: {} | Valid: {}",
            self.label, self.pending, self.processed, self.valid
        )
    }
}

/// Receives progress updates from a running crawl or scrape.
///
/// Implementations must be `Send + Sync` so a single observer can be
/// shared through an [`Arc`].
pub trait ProgressObserver: Send + Sync {
    /// Called after each batch.
    fn on_batch(&self, progress: &BatchProgress);

    /// Called once when the run ends.
    fn on_finish(&self, progress: &BatchProgress);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressObserver for NullProgress {
    fn on_batch(&self, _progress: &BatchProgress) {}
    fn on_finish(&self, _progress: &BatchProgress) {}
}

/// Writes each update to the log.
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_batch(&self, progress: &BatchProgress) {
        log::debug!("{progress}");
    }

    fn on_finish(&self, progress: &BatchProgress) {
        log::info!("{progress}");
    }
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressObserver> {
    Arc::new(NullProgress)
}

/// Returns a shared [`LogProgress`].
#[must_use]
pub fn log_progress() -> Arc<dyn ProgressObserver> {
    Arc::new(LogProgress)
}
