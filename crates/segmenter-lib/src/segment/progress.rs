//! Progress reporting for segmentation passes

use crate::models::LabelKey;
use tokio::sync::mpsc;

/// Progress after one label group finished
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub group: LabelKey,
}

/// Receives progress updates from the orchestrator
pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress: Progress);
}

/// Adapts a closure into a [`ProgressReporter`]
pub struct ProgressFn<F>(pub F);

impl<F> ProgressReporter for ProgressFn<F>
where
    F: Fn(Progress) + Send + Sync,
{
    fn report(&self, progress: Progress) {
        (self.0)(progress)
    }
}

impl ProgressReporter for mpsc::UnboundedSender<Progress> {
    fn report(&self, progress: Progress) {
        // Receiver may have gone away; progress is best effort
        let _ = self.send(progress);
    }
}
