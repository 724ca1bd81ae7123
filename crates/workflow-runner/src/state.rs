//! Workflow state model.
//!
//! `WorkflowState` is owned by the runner and only ever handed out as a
//! `WorkflowSnapshot`, a deep copy tagged with a sequence number.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::StepDefinition;

/// Top-level status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    /// Nothing has run since construction or the last reset.
    Idle,
    /// Steps are being advanced.
    Running,
    /// Stopped by the user. Terminal until the next start or reset.
    Stopped,
    /// A step failed and advancement halted.
    Error,
    /// All steps finished.
    Completed,
}

impl WorkflowPhase {
    /// Whether the phase ends a run (everything except `Idle` and `Running`).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Error | Self::Completed)
    }

    /// Badge text shown by dashboards.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::Stopped => "Stopped",
            Self::Error => "Error",
            Self::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error => write!(f, "error"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Status of a single step.
///
/// Valid transitions are `Idle -> Done` and `Idle -> Error`. Only a
/// whole-state reset (or a new start) moves a step back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Idle,
    Done,
    Error,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Display record for one pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: StepStatus,
}

impl From<&StepDefinition> for StepRecord {
    fn from(def: &StepDefinition) -> Self {
        Self {
            id: def.id.clone(),
            title: def.title.clone(),
            description: def.description.clone(),
            status: StepStatus::Idle,
        }
    }
}

/// Severity of a pipeline log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// One line of the run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

/// Complete state of the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub phase: WorkflowPhase,
    pub steps: Vec<StepRecord>,
    /// Index of the step being worked on; equals `steps.len()` once all are done.
    pub current_step_index: usize,
    /// Overall progress in `[0.0, 1.0]`.
    pub overall_progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub log: Vec<LogEntry>,
}

impl WorkflowState {
    /// Create the initial state for the given steps.
    pub fn new(steps: &[StepDefinition]) -> Self {
        Self {
            phase: WorkflowPhase::Idle,
            steps: steps.iter().map(StepRecord::from).collect(),
            current_step_index: 0,
            overall_progress: 0.0,
            run_id: None,
            started_at: None,
            log: Vec::new(),
        }
    }

    /// Number of steps with status `Done`.
    pub fn steps_completed(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Done)
            .count()
    }

    /// Completed-steps counter, e.g. `"2/3"`.
    pub fn steps_counter(&self) -> String {
        format!("{}/{}", self.steps_completed(), self.steps.len())
    }

    /// Overall progress as a truncated whole percentage.
    pub fn progress_percent(&self) -> u8 {
        (self.overall_progress.clamp(0.0, 1.0) * 100.0) as u8
    }

    /// The step currently being worked on, if any.
    pub fn current_step(&self) -> Option<&StepRecord> {
        self.steps.get(self.current_step_index)
    }

    /// Time elapsed since the run started.
    pub fn run_duration(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.started_at.map(|started| now - started)
    }

    /// Human-readable run duration.
    pub fn duration_label(&self, now: DateTime<Utc>) -> String {
        match self.run_duration(now) {
            None => "—".to_string(),
            Some(d) if d < Duration::minutes(1) => "less than a minute".to_string(),
            Some(d) => format!("{} min", d.num_minutes()),
        }
    }

    /// The last `limit` log entries.
    pub fn log_tail(&self, limit: usize) -> &[LogEntry] {
        let start = self.log.len().saturating_sub(limit);
        &self.log[start..]
    }
}

/// Immutable copy of the state handed to observers and renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    /// Increases by one with every mutation of the runner's state.
    pub sequence: u64,
    pub state: WorkflowState,
}

impl WorkflowSnapshot {
    /// Serialize the snapshot as a single JSON line.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl std::ops::Deref for WorkflowSnapshot {
    type Target = WorkflowState;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}
