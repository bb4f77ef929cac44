//! Run event system for observability.
//!
//! Emits [`RunEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! external observers (loggers, progress displays, etc.) can follow a run's
//! progress without coupling to the runner internals.

use serde::{Deserialize, Serialize};

/// Events emitted during a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        year: i32,
        measures: usize,
    },
    RunCompleted {
        run_id: String,
        year: i32,
        artifacts: usize,
        duration_ms: u64,
    },
    RunFailed {
        run_id: String,
        error: String,
    },
    StageStarted {
        stage: String,
    },
    StageCompleted {
        stage: String,
        duration_ms: u64,
    },
    FetchCompleted {
        measure: String,
        rows: usize,
    },
    FetchFailed {
        measure: String,
        error: String,
    },
    RowsUnmatched {
        measure: String,
        count: usize,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<RunEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitter_sends_and_receives() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();

        emitter.emit(RunEvent::RunStarted {
            run_id: "run-1".into(),
            year: 2022,
            measures: 4,
        });

        let event = rx.recv().await.unwrap();
        match event {
            RunEvent::RunStarted { run_id, year, measures } => {
                assert_eq!(run_id, "run-1");
                assert_eq!(year, 2022);
                assert_eq!(measures, 4);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let emitter = EventEmitter::new(16);
        let mut rx1 = emitter.subscribe();
        let mut rx2 = emitter.subscribe();

        emitter.emit(RunEvent::RowsUnmatched {
            measure: "poverty_rate".into(),
            count: 3089,
        });

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();

        let json1 = serde_json::to_string(&e1).unwrap();
        let json2 = serde_json::to_string(&e2).unwrap();
        assert_eq!(json1, json2);
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let emitter = EventEmitter::new(16);
        emitter.emit(RunEvent::RunFailed {
            run_id: "run-9".into(),
            error: "something went wrong".into(),
        });
    }

    #[test]
    fn event_serialization_round_trip() {
        let event = RunEvent::FetchCompleted {
            measure: "unemployment_rate".into(),
            rows: 3142,
        };

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: RunEvent = serde_json::from_str(&json).unwrap();

        match deserialized {
            RunEvent::FetchCompleted { measure, rows } => {
                assert_eq!(measure, "unemployment_rate");
                assert_eq!(rows, 3142);
            }
            other => panic!("unexpected variant after round-trip: {:?}", other),
        }
    }
}
