use std::sync::Mutex;

use tokio::time::Instant;

use crate::models::PipelineStep;

/// Remembers which stage is running so a soft timeout, which drops the stage
/// future mid-flight, can still log that stage as failed.
#[derive(Debug, Default)]
pub struct StageTracker {
    current: Mutex<Option<(PipelineStep, Instant)>>,
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self, step: PipelineStep) {
        *self.slot() = Some((step, Instant::now()));
    }

    pub fn leave(&self) {
        *self.slot() = None;
    }

    /// The in-flight stage and how long it has been running, in milliseconds.
    pub fn in_flight(&self) -> Option<(PipelineStep, u64)> {
        let current = *self.slot();
        current.map(|(step, started)| (step, started.elapsed().as_millis() as u64))
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<(PipelineStep, Instant)>> {
        // A poisoned slot still holds a valid value.
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_reports_only_the_open_stage() {
        let tracker = StageTracker::new();
        assert!(tracker.in_flight().is_none());

        tracker.enter(PipelineStep::CvEvaluation);
        assert_eq!(tracker.in_flight().map(|(s, _)| s), Some(PipelineStep::CvEvaluation));

        tracker.leave();
        assert!(tracker.in_flight().is_none());
    }
}
