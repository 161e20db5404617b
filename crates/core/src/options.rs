//! Per-run settings handed to the planner and runner.

use std::fmt;
use std::sync::Arc;

/// Stage of a reconciliation run reported to a [`ProgressSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Planning,
    Applying,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planning => f.write_str("planning"),
            Self::Applying => f.write_str("applying"),
        }
    }
}

/// Receives per-user progress of a run.
pub trait ProgressSink: Send + Sync {
    /// A phase over `total` users begins.
    fn start(&self, phase: Phase, total: u64);

    /// One more user of the current phase is done.
    fn advance(&self, username: &str);

    /// The current phase ended, successfully or not.
    fn finish(&self);
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&self, _phase: Phase, _total: u64) {}
    fn advance(&self, _username: &str) {}
    fn finish(&self) {}
}

/// Immutable settings of one run.
#[derive(Clone)]
pub struct RunOptions {
    /// Log what the runner would do without calling any mutation.
    pub dry_run: bool,
    pub progress: Arc<dyn ProgressSink>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            progress: Arc::new(NoProgress),
        }
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl RunOptions {
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}
