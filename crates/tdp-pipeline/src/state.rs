//! Run and stage state tracking
//!
//! One [`RunState`] exists per pipeline execution. It is created when the run
//! starts, mutated only by the orchestrator, and handed back to the caller as
//! the final report. Nothing here is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// The three pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Extract,
    Transform,
    Load,
}

impl StageKind {
    pub const ALL: [StageKind; 3] = [StageKind::Extract, StageKind::Transform, StageKind::Load];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Extract => "extract",
            StageKind::Transform => "transform",
            StageKind::Load => "load",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Overall status of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of one stage within a run. `Retrying` marks the window between a
/// failed attempt and the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Retrying,
    Succeeded,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Retrying => "retrying",
            StageStatus::Succeeded => "succeeded",
            StageStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-stage bookkeeping: status, attempt counter, row count, timing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageState {
    pub status: StageStatus,
    pub attempts: u32,
    pub rows: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StageState {
    pub(crate) fn begin_attempt(&mut self, attempt: u32) {
        self.status = StageStatus::Running;
        self.attempts = attempt;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    pub(crate) fn mark_retrying(&mut self) {
        self.status = StageStatus::Retrying;
    }

    pub(crate) fn mark_succeeded(&mut self) {
        self.status = StageStatus::Succeeded;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn mark_failed(&mut self) {
        self.status = StageStatus::Failed;
        self.finished_at = Some(Utc::now());
    }
}

/// One record per pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub source: PathBuf,
    pub destination: String,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub extract: StageState,
    pub transform: StageState,
    pub load: StageState,
}

impl RunState {
    pub fn new(source: &Path, destination: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            source: source.to_path_buf(),
            destination: destination.to_string(),
            status: RunStatus::Pending,
            started_at: None,
            finished_at: None,
            extract: StageState::default(),
            transform: StageState::default(),
            load: StageState::default(),
        }
    }

    pub fn stage(&self, kind: StageKind) -> &StageState {
        match kind {
            StageKind::Extract => &self.extract,
            StageKind::Transform => &self.transform,
            StageKind::Load => &self.load,
        }
    }

    pub(crate) fn stage_mut(&mut self, kind: StageKind) -> &mut StageState {
        match kind {
            StageKind::Extract => &mut self.extract,
            StageKind::Transform => &mut self.transform,
            StageKind::Load => &mut self.load,
        }
    }

    pub(crate) fn mark_running(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn mark_succeeded(&mut self) {
        self.status = RunStatus::Succeeded;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn mark_failed(&mut self) {
        self.status = RunStatus::Failed;
        self.finished_at = Some(Utc::now());
    }

    /// Rows written by the load stage, when it ran to completion.
    pub fn rows_loaded(&self) -> Option<u64> {
        self.load.rows
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn stage_accessors_map_to_fields() {
        let mut run = RunState::new(Path::new("data.csv"), "default");
        run.stage_mut(StageKind::Transform).begin_attempt(1);
        assert_eq!(run.transform.status, StageStatus::Running);
        assert_eq!(run.stage(StageKind::Transform).attempts, 1);
        assert_eq!(run.stage(StageKind::Extract).status, StageStatus::Pending);
    }

    #[test]
    fn begin_attempt_keeps_first_start_time() {
        let mut stage = StageState::default();
        stage.begin_attempt(1);
        let first = stage.started_at;
        stage.mark_retrying();
        stage.begin_attempt(2);
        assert_eq!(stage.started_at, first);
        assert_eq!(stage.attempts, 2);
    }

    #[test]
    fn run_transitions_set_timestamps() {
        let mut run = RunState::new(Path::new("data.csv"), "default");
        assert_eq!(run.status, RunStatus::Pending);
        run.mark_running();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.started_at.is_some());
        run.mark_succeeded();
        assert!(run.status.is_terminal());
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn status_names_round_trip_display() {
        assert_eq!(RunStatus::Succeeded.to_string(), "succeeded");
        assert_eq!(StageStatus::Retrying.to_string(), "retrying");
        assert_eq!(StageKind::Load.to_string(), "load");
    }
}
