//! Pipeline lifecycle events
//!
//! The orchestrator reports progress through an [`EventSink`] rather than
//! logging directly, so embedders can observe runs programmatically. The
//! default sink forwards to `tracing`.

use serde::Serialize;
use uuid::Uuid;

use crate::state::{RunStatus, StageKind};

/// One observable moment in a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum PipelineEvent {
    RunStarted {
        run_id: Uuid,
        destination: String,
    },
    StageStarted {
        run_id: Uuid,
        stage: StageKind,
        attempt: u32,
    },
    StageSucceeded {
        run_id: Uuid,
        stage: StageKind,
        attempt: u32,
    },
    StageFailed {
        run_id: Uuid,
        stage: StageKind,
        kind: &'static str,
        attempt: u32,
        will_retry: bool,
    },
    /// Dataset shape after a stage: rows extracted, rows surviving the
    /// cleaning rules, rows written.
    RowCount {
        run_id: Uuid,
        stage: StageKind,
        rows: u64,
    },
    RunFinished {
        run_id: Uuid,
        status: RunStatus,
    },
}

/// Receiver for pipeline events. Implementations must be cheap; `emit` is
/// called inline on the run path.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PipelineEvent);
}

/// Default sink: structured tracing records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::RunStarted {
                run_id,
                destination,
            } => {
                tracing::info!(%run_id, %destination, "pipeline run started");
            }
            PipelineEvent::StageStarted {
                run_id,
                stage,
                attempt,
            } => {
                tracing::info!(%run_id, %stage, attempt, "stage started");
            }
            PipelineEvent::StageSucceeded {
                run_id,
                stage,
                attempt,
            } => {
                tracing::info!(%run_id, %stage, attempt, "stage succeeded");
            }
            PipelineEvent::StageFailed {
                run_id,
                stage,
                kind,
                attempt,
                will_retry,
            } => {
                if *will_retry {
                    tracing::warn!(%run_id, %stage, kind, attempt, "stage failed, retrying");
                } else {
                    tracing::error!(%run_id, %stage, kind, attempt, "stage failed");
                }
            }
            PipelineEvent::RowCount {
                run_id,
                stage,
                rows,
            } => {
                tracing::info!(%run_id, %stage, rows, "stage row count");
            }
            PipelineEvent::RunFinished { run_id, status } => {
                tracing::info!(%run_id, status = %status, "pipeline run finished");
            }
        }
    }
}

/// Buffering sink for tests and embedders that inspect runs after the fact.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: std::sync::Mutex<Vec<PipelineEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &PipelineEvent) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event.clone());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        let run_id = Uuid::new_v4();

        sink.emit(&PipelineEvent::RunStarted {
            run_id,
            destination: "default".to_string(),
        });
        sink.emit(&PipelineEvent::RunFinished {
            run_id,
            status: RunStatus::Succeeded,
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], PipelineEvent::RunStarted { .. }));
        assert!(matches!(
            events[1],
            PipelineEvent::RunFinished {
                status: RunStatus::Succeeded,
                ..
            }
        ));
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = PipelineEvent::StageFailed {
            run_id: Uuid::nil(),
            stage: StageKind::Load,
            kind: "connection_lost",
            attempt: 2,
            will_retry: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "stage-failed");
        assert_eq!(json["stage"], "load");
        assert_eq!(json["kind"], "connection_lost");
        assert_eq!(json["will_retry"], true);
    }
}
