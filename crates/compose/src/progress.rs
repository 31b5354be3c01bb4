//! Job progress reporting and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use splice_common::error::{SpliceError, SpliceResult};

/// Progress callback for composition jobs.
pub type ProgressCallback = Box<dyn Fn(Progress) + Send + Sync>;

/// Progress report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    /// Overall progress in `[0, 100]`.
    pub percent: f64,

    /// Current stage.
    pub stage: ProgressStage,

    /// Zero-based index of the clip being processed.
    pub clip_index: usize,

    /// Number of clips in the job.
    pub clip_count: usize,
}

/// Stages of a composition job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Preparing,
    Normalizing,
    Writing,
    Finalizing,
    Complete,
}

/// Emits non-decreasing progress for one job.
///
/// Work before finalize is scaled into `[0, ceiling]`; 100% is only
/// reported by [`ProgressReporter::complete`].
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    ceiling: f64,
    clip_count: usize,
    last: f64,
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressCallback>, ceiling_percent: f64, clip_count: usize) -> Self {
        let ceiling = if ceiling_percent.is_finite() {
            ceiling_percent.clamp(0.0, 100.0)
        } else {
            90.0
        };
        Self {
            callback,
            ceiling,
            clip_count,
            last: 0.0,
        }
    }

    /// Reporter that records progress without a callback.
    pub fn silent(clip_count: usize) -> Self {
        Self::new(None, 90.0, clip_count)
    }

    pub fn last_percent(&self) -> f64 {
        self.last
    }

    /// Report progress `within` (`[0, 1]`) of clip `clip_index`.
    pub fn clip(&mut self, stage: ProgressStage, clip_index: usize, within: f64) {
        let count = self.clip_count.max(1) as f64;
        let within = if within.is_finite() { within.clamp(0.0, 1.0) } else { 0.0 };
        let fraction = (clip_index as f64 + within) / count;
        self.emit(stage, clip_index, fraction * self.ceiling);
    }

    pub fn preparing(&mut self) {
        self.emit(ProgressStage::Preparing, 0, 0.0);
    }

    /// All clips written; the container is being finished.
    pub fn finalizing(&mut self) {
        let index = self.clip_count.saturating_sub(1);
        self.emit(ProgressStage::Finalizing, index, self.ceiling);
    }

    /// The output was finalized.
    pub fn complete(&mut self) {
        let index = self.clip_count.saturating_sub(1);
        self.emit(ProgressStage::Complete, index, 100.0);
    }

    fn emit(&mut self, stage: ProgressStage, clip_index: usize, percent: f64) {
        let cap = if stage == ProgressStage::Complete {
            100.0
        } else {
            self.ceiling
        };
        let percent = percent.min(cap).max(self.last);
        self.last = percent;
        if let Some(cb) = &self.callback {
            cb(Progress {
                percent,
                stage,
                clip_index,
                clip_count: self.clip_count,
            });
        }
    }
}

/// Shared stop flag for one job.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the token has been set.
    pub fn check(&self) -> SpliceResult<()> {
        if self.is_cancelled() {
            Err(SpliceError::Cancelled)
        } else {
            Ok(())
        }
    }
}
