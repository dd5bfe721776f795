use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::models::WorkflowPhase;

/// Broadcasts the progress marker of the running analysis. The marker only
/// moves forward until it is reset for the next cycle.
#[derive(Clone)]
pub struct PhaseTracker {
    sender: Arc<watch::Sender<WorkflowPhase>>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(WorkflowPhase::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowPhase> {
        self.sender.subscribe()
    }

    pub fn current(&self) -> WorkflowPhase {
        *self.sender.borrow()
    }

    pub fn reset(&self) {
        self.sender.send_replace(WorkflowPhase::default());
    }

    /// Move to `phase` if it lies ahead of the current one. Returns whether
    /// the marker moved.
    pub fn advance_to(&self, phase: WorkflowPhase) -> bool {
        let moved = self.sender.send_if_modified(|current| {
            if phase > *current {
                *current = phase;
                true
            } else {
                false
            }
        });
        if moved {
            debug!("Progress: {}", phase);
        }
        moved
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_moves_backwards() {
        let tracker = PhaseTracker::new();
        assert_eq!(tracker.current(), WorkflowPhase::ProcessingImage);

        assert!(tracker.advance_to(WorkflowPhase::AiAnalysis));
        assert!(!tracker.advance_to(WorkflowPhase::ExtractingText));
        assert!(!tracker.advance_to(WorkflowPhase::AiAnalysis));
        assert_eq!(tracker.current(), WorkflowPhase::AiAnalysis);

        tracker.reset();
        assert_eq!(tracker.current(), WorkflowPhase::ProcessingImage);
    }

    #[tokio::test]
    async fn subscribers_see_updates() {
        let tracker = PhaseTracker::new();
        let mut receiver = tracker.subscribe();

        tracker.advance_to(WorkflowPhase::ExtractingText);
        receiver.changed().await.unwrap();
        assert_eq!(*receiver.borrow_and_update(), WorkflowPhase::ExtractingText);

        tracker.advance_to(WorkflowPhase::ProcessingImage);
        assert!(!receiver.has_changed().unwrap());
    }
}
