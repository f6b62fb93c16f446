//! Progress tracking for tree synchronization

use ferromirror_types::{ProgressReporter, ProgressUpdate};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Synchronization phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    /// Building the remote manifest
    Listing,
    /// Creating local directories
    CreatingDirectories,
    /// Downloading files
    Downloading,
    /// Finished normally
    Completed,
    /// Stopped by a cancellation request
    Cancelled,
    /// Manifest could not be built
    Failed,
}

/// Progress state of one synchronization run
#[derive(Debug, Clone)]
pub struct SyncProgress {
    /// Current phase
    pub phase: SyncPhase,
    /// Manifest items handled so far
    pub processed: u64,
    /// Manifest items to handle
    pub total: u64,
    /// Item being handled
    pub current: Option<String>,
}

impl SyncProgress {
    /// Create progress in the listing phase
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Listing,
            processed: 0,
            total: 0,
            current: None,
        }
    }

    /// Update the current phase
    pub fn set_phase(&mut self, phase: SyncPhase) {
        self.phase = phase;
        debug!("Sync phase changed to: {:?}", phase);
    }

    /// Percentage of items handled
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.processed as f64 / self.total as f64) * 100.0
        }
    }

    /// Check if the run is over
    pub fn is_complete(&self) -> bool {
        matches!(
            self.phase,
            SyncPhase::Completed | SyncPhase::Cancelled | SyncPhase::Failed
        )
    }
}

impl Default for SyncProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts items and forwards ticks to a [`ProgressReporter`]
pub struct ProgressTracker<'a> {
    progress: SyncProgress,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> ProgressTracker<'a> {
    /// Start tracking
    pub fn new(reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            progress: SyncProgress::new(),
            reporter,
        }
    }

    /// Snapshot of the current state
    pub fn progress(&self) -> &SyncProgress {
        &self.progress
    }

    /// Set the item total once the manifest is known
    pub fn set_total(&mut self, total: u64) {
        self.progress.total = total;
        self.reporter
            .report(&ProgressUpdate::new(0, total, "Remote tree listed"));
    }

    /// Enter a phase
    pub fn set_phase(&mut self, phase: SyncPhase) {
        self.progress.set_phase(phase);
    }

    /// Record one handled item
    pub fn item_done(&mut self, item: &str) {
        self.progress.processed += 1;
        self.progress.current = Some(item.to_string());
        self.reporter.report(&ProgressUpdate::new(
            self.progress.processed,
            self.progress.total,
            item,
        ));
    }

    /// Close the run with a summary
    pub fn finish(&mut self, phase: SyncPhase, summary: &str) {
        self.progress.set_phase(phase);
        self.progress.current = None;
        self.reporter.finish(summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect {
        ticks: Mutex<Vec<(u64, u64, String)>>,
        finished: Mutex<Option<String>>,
    }

    impl ProgressReporter for Collect {
        fn report(&self, update: &ProgressUpdate) {
            self.ticks
                .lock()
                .unwrap()
                .push((update.processed, update.total, update.message.clone()));
        }

        fn finish(&self, message: &str) {
            *self.finished.lock().unwrap() = Some(message.to_string());
        }
    }

    #[test]
    fn test_tracker_counts_items() {
        let sink = Collect::default();
        let mut tracker = ProgressTracker::new(&sink);
        tracker.set_total(2);
        tracker.set_phase(SyncPhase::Downloading);
        tracker.item_done("a");
        tracker.item_done("a/b.txt");
        assert_eq!(tracker.progress().percentage(), 100.0);
        tracker.finish(SyncPhase::Completed, "done");

        let ticks = sink.ticks.lock().unwrap();
        assert_eq!(ticks.len(), 3);
        assert_eq!(ticks[2], (2, 2, "a/b.txt".to_string()));
        assert_eq!(sink.finished.lock().unwrap().as_deref(), Some("done"));
        assert!(tracker.progress().is_complete());
    }

    #[test]
    fn test_percentage_without_total() {
        assert_eq!(SyncProgress::new().percentage(), 0.0);
        assert!(!SyncProgress::new().is_complete());
    }
}
