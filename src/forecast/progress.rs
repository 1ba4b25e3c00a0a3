use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Pipeline phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    FeatureEngineering,
    Normalizing,
    Windowing,
    Splitting,
    Training,
    Evaluating,
    Forecasting,
    Done,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Idle => "Idle",
            Phase::FeatureEngineering => "Computing technical indicators...",
            Phase::Normalizing => "Normalizing features...",
            Phase::Windowing => "Building training windows...",
            Phase::Splitting => "Splitting train/test data...",
            Phase::Training => "Training model...",
            Phase::Evaluating => "Evaluating on test data...",
            Phase::Forecasting => "Computing forecast...",
            Phase::Done => "Done",
            Phase::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// Snapshot of a run's progress.
///
/// A phase transition is reported by one event: `phase` is the phase being
/// entered and `exited` the one just left. Epoch events stay inside
/// `Training` and carry no `exited`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub current_epoch: usize,
    pub total_epochs: usize,
    /// Mean training loss of the epoch just finished
    pub loss: Option<f64>,
    /// Denormalized test RMSE, once evaluated
    pub rmse: Option<f64>,
    pub phase: Phase,
    #[serde(default)]
    pub exited: Option<Phase>,
}

impl ProgressEvent {
    pub fn new(phase: Phase, current_epoch: usize, total_epochs: usize) -> Self {
        Self {
            current_epoch,
            total_epochs,
            loss: None,
            rmse: None,
            phase,
            exited: None,
        }
    }

    /// Event emitted after a training epoch
    pub fn epoch(current_epoch: usize, total_epochs: usize, loss: f64) -> Self {
        Self {
            loss: Some(loss),
            ..Self::new(Phase::Training, current_epoch, total_epochs)
        }
    }

    pub fn with_rmse(mut self, rmse: Option<f64>) -> Self {
        self.rmse = rmse;
        self
    }

    pub fn with_exited(mut self, exited: Option<Phase>) -> Self {
        self.exited = exited;
        self
    }
}

/// Receiver side of progress reporting.
///
/// Implementations must return promptly; a sink that can no longer deliver
/// events drops them.
pub trait ProgressSink {
    fn emit(&self, event: ProgressEvent);
}

impl ProgressSink for tokio::sync::mpsc::UnboundedSender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        if self.send(event).is_err() {
            debug!("Progress receiver closed, dropping event");
        }
    }
}

impl ProgressSink for std::sync::mpsc::Sender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        if self.send(event).is_err() {
            debug!("Progress receiver closed, dropping event");
        }
    }
}

/// Deliver an event, containing a panic raised by the sink.
///
/// Observers never abort a run: a panicking sink loses the event and the
/// pipeline carries on.
pub(crate) fn emit_guarded(sink: &dyn ProgressSink, event: ProgressEvent) {
    let phase = event.phase;
    if panic::catch_unwind(AssertUnwindSafe(|| sink.emit(event))).is_err() {
        warn!("Progress sink panicked on a {:?} event; continuing", phase);
    }
}

/// Sink that discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn emit(&self, _event: ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        assert!(Phase::Idle < Phase::FeatureEngineering);
        assert!(Phase::Training < Phase::Evaluating);
        assert!(Phase::Forecasting < Phase::Done);
        assert!(Phase::Done.is_terminal());
        assert!(Phase::Failed.is_terminal());
        assert!(!Phase::Training.is_terminal());
    }

    #[test]
    fn test_epoch_event() {
        let event = ProgressEvent::epoch(3, 10, 0.25);
        assert_eq!(event.phase, Phase::Training);
        assert_eq!(event.current_epoch, 3);
        assert_eq!(event.loss, Some(0.25));
        assert_eq!(event.rmse, None);
    }

    #[test]
    fn test_closed_channel_is_not_fatal() {
        let (tx, rx) = std::sync::mpsc::channel();
        drop(rx);
        tx.emit(ProgressEvent::new(Phase::Idle, 0, 5));

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        tx.emit(ProgressEvent::new(Phase::Idle, 0, 5));
    }

    struct PanickingSink;

    impl ProgressSink for PanickingSink {
        fn emit(&self, _event: ProgressEvent) {
            panic!("sink failure");
        }
    }

    #[test]
    fn test_guarded_emit_contains_sink_panic() {
        emit_guarded(&PanickingSink, ProgressEvent::new(Phase::Idle, 0, 5));

        let (tx, rx) = std::sync::mpsc::channel();
        emit_guarded(&tx, ProgressEvent::epoch(1, 5, 0.5));
        assert_eq!(rx.try_recv().unwrap().current_epoch, 1);
    }

    #[test]
    fn test_event_serializes_snake_case_phase() {
        let event = ProgressEvent::new(Phase::FeatureEngineering, 0, 10);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"phase\":\"feature_engineering\""));
        assert!(json.contains("\"loss\":null"));

        let event = event.with_exited(Some(Phase::Idle));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"exited\":\"idle\""));
        let restored: ProgressEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, event);
    }
}
