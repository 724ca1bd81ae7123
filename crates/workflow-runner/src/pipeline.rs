//! Pipeline definition and the step-advancing state machine.
//!
//! `Pipeline` holds no clock and no lock. Simulated time only moves through
//! explicit `tick(elapsed)` calls; `WorkflowRunner` adds synchronization,
//! scheduling and observer notification on top.

use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{RunnerError, RunnerResult};
use crate::state::{LogEntry, LogLevel, StepStatus, WorkflowPhase, WorkflowState};

/// Log lines appended by every successful `start()`.
pub const START_MESSAGES: [&str; 2] = [
    "Initializing ChatGPT API connection",
    "Sending story generation prompt",
];

/// Default nominal duration of a step.
pub const DEFAULT_STEP_DURATION: Duration = Duration::from_secs(3);

/// Static description of one pipeline step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDefinition {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Simulated time the step takes to finish.
    pub duration: Duration,
}

impl StepDefinition {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            duration,
        }
    }
}

/// Ordered steps plus the optional failure-injection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDefinition {
    pub steps: Vec<StepDefinition>,
    /// Step id that fails as soon as it is entered.
    pub fail_at_step: Option<String>,
}

impl PipelineDefinition {
    /// The three-stage story/video/download pipeline with a uniform step duration.
    pub fn story_to_video(step_duration: Duration) -> Self {
        Self {
            steps: vec![
                StepDefinition::new(
                    "story_creation",
                    "Story Creation",
                    "Generating story using ChatGPT API",
                    step_duration,
                ),
                StepDefinition::new(
                    "video_generation",
                    "Video Generation",
                    "Automating 3rd-party web app",
                    step_duration,
                ),
                StepDefinition::new(
                    "file_download",
                    "File Download",
                    "Downloading completed video file",
                    step_duration,
                ),
            ],
            fail_at_step: None,
        }
    }

    /// Inject a simulated failure at the given step.
    pub fn with_failure_at(mut self, step_id: impl Into<String>) -> Self {
        self.fail_at_step = Some(step_id.into());
        self
    }

    pub fn contains_step(&self, step_id: &str) -> bool {
        self.steps.iter().any(|s| s.id == step_id)
    }
}

impl Default for PipelineDefinition {
    fn default() -> Self {
        Self::story_to_video(DEFAULT_STEP_DURATION)
    }
}

/// Per-step bookkeeping that is not part of the visible state.
#[derive(Debug, Clone, Copy, Default)]
struct StepClock {
    elapsed: Duration,
    /// Set on the first tick inside the step; guards the "step started" log line.
    entered: bool,
}

/// Deterministic state machine driving `WorkflowState`.
#[derive(Debug, Clone)]
pub struct Pipeline {
    definition: PipelineDefinition,
    state: WorkflowState,
    clocks: Vec<StepClock>,
}

impl Pipeline {
    /// Create a pipeline in the initial `Idle` state.
    pub fn new(definition: PipelineDefinition) -> Self {
        let state = WorkflowState::new(&definition.steps);
        let clocks = vec![StepClock::default(); definition.steps.len()];
        Self {
            definition,
            state,
            clocks,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.phase == WorkflowPhase::Running
    }

    /// Begin a new run.
    ///
    /// Rejected without any effect while a run is in progress.
    pub fn start(&mut self) -> RunnerResult<()> {
        if self.is_running() {
            return Err(RunnerError::AlreadyRunning);
        }

        let run_id = Uuid::new_v4();
        self.clear();
        self.state.phase = WorkflowPhase::Running;
        self.state.run_id = Some(run_id);
        self.state.started_at = Some(Utc::now());

        tracing::info!(
            run_id = %run_id,
            steps = self.definition.steps.len(),
            fail_at_step = ?self.definition.fail_at_step,
            "Workflow started"
        );

        for message in START_MESSAGES {
            self.log(LogLevel::Info, message);
        }
        Ok(())
    }

    /// Halt the current run. Step statuses stay as they are.
    pub fn stop(&mut self) -> RunnerResult<()> {
        if !self.is_running() {
            return Err(RunnerError::NotRunning);
        }

        self.state.phase = WorkflowPhase::Stopped;
        self.log(LogLevel::Info, "Pipeline stopped by user");
        tracing::info!(
            run_id = ?self.state.run_id,
            progress = self.state.overall_progress,
            "Workflow stopped"
        );
        Ok(())
    }

    /// Return to the initial state, whatever the current phase.
    pub fn reset(&mut self) {
        if let Some(run_id) = self.state.run_id {
            tracing::debug!(run_id = %run_id, phase = %self.state.phase, "Workflow reset");
        }
        self.clear();
    }

    /// Advance simulated time by `elapsed`.
    ///
    /// Returns `true` if the visible state changed. Time left over after a
    /// step completes carries into the next step.
    pub fn tick(&mut self, elapsed: Duration) -> bool {
        if !self.is_running() {
            return false;
        }

        let before = (
            self.state.overall_progress,
            self.state.current_step_index,
            self.state.log.len(),
        );

        let mut remaining = elapsed;
        while self.is_running() {
            let index = self.state.current_step_index;
            if index >= self.definition.steps.len() {
                self.complete();
                break;
            }

            if !self.clocks[index].entered {
                self.enter_step(index);
                if !self.is_running() {
                    break;
                }
            }

            let duration = self.definition.steps[index].duration;
            let clock = &mut self.clocks[index];
            let consumed = remaining.min(duration.saturating_sub(clock.elapsed));
            clock.elapsed += consumed;
            remaining -= consumed;

            let finished = clock.elapsed >= duration;
            let local = if finished {
                1.0
            } else {
                clock.elapsed.as_secs_f64() / duration.as_secs_f64()
            };
            self.raise_progress(index, local);

            if !finished {
                break;
            }
            self.finish_step(index);
            if remaining.is_zero() {
                break;
            }
        }

        before
            != (
                self.state.overall_progress,
                self.state.current_step_index,
                self.state.log.len(),
            )
    }

    fn clear(&mut self) {
        self.state = WorkflowState::new(&self.definition.steps);
        self.clocks.fill(StepClock::default());
    }

    fn enter_step(&mut self, index: usize) {
        self.clocks[index].entered = true;

        let total = self.definition.steps.len();
        let step = &self.definition.steps[index];
        let message = format!("Step {}/{}: {}", index + 1, total, step.description);
        let fails = self.definition.fail_at_step.as_deref() == Some(step.id.as_str());
        let title = step.title.clone();
        self.log(LogLevel::Info, message);

        if fails {
            self.state.steps[index].status = StepStatus::Error;
            self.state.phase = WorkflowPhase::Error;
            self.log(LogLevel::Error, format!("{title} failed."));
        }
    }

    fn finish_step(&mut self, index: usize) {
        self.state.steps[index].status = StepStatus::Done;
        let title = self.definition.steps[index].title.clone();
        self.log(LogLevel::Success, format!("{title} completed."));
        self.state.current_step_index = index + 1;

        if self.state.current_step_index == self.definition.steps.len() {
            self.complete();
        }
    }

    fn complete(&mut self) {
        self.state.phase = WorkflowPhase::Completed;
        self.state.overall_progress = 1.0;
        self.log(LogLevel::Success, "Workflow completed.");
        tracing::info!(run_id = ?self.state.run_id, "Workflow completed");
    }

    fn raise_progress(&mut self, index: usize, local: f64) {
        let total = self.definition.steps.len() as f64;
        let target = ((index as f64 + local.min(1.0)) / total).clamp(0.0, 1.0);
        if target > self.state.overall_progress {
            self.state.overall_progress = target;
        }
    }

    fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry::new(level, message);
        let run_id = self.state.run_id;
        match level {
            LogLevel::Info | LogLevel::Success => {
                tracing::debug!(run_id = ?run_id, level = %level, "{}", entry.message)
            }
            LogLevel::Error => tracing::warn!(run_id = ?run_id, "{}", entry.message),
        }
        self.state.log.push(entry);
    }
}
