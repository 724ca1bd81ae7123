//! Plain-text rendering of workflow snapshots.

use chrono::{DateTime, Local, Utc};
use uuid::Uuid;
use workflow_runner::{LogEntry, StepStatus, WorkflowState};

const BAR_WIDTH: usize = 30;

/// One-line summary: badge, progress bar, step counter and current step.
pub fn status_line(state: &WorkflowState) -> String {
    let current = match state.current_step() {
        Some(step) if state.started_at.is_some() => format!("  {}", step.title),
        _ => String::new(),
    };
    format!(
        "[{:<9}] {} {:>3}%  {} steps{}",
        state.phase.label(),
        progress_bar(state.overall_progress),
        state.progress_percent(),
        state.steps_counter(),
        current
    )
}

/// Multi-line view of the whole state, log limited to the last `log_tail` lines.
pub fn dashboard(state: &WorkflowState, now: DateTime<Utc>, log_tail: usize) -> String {
    let started = state
        .started_at
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());

    let mut out = Vec::new();
    out.push(status_line(state));
    out.push(format!(
        "Started {}  Duration {}",
        started,
        state.duration_label(now)
    ));
    for (i, step) in state.steps.iter().enumerate() {
        let marker = match step.status {
            StepStatus::Idle if i == state.current_step_index && state.started_at.is_some() => ">",
            StepStatus::Idle => " ",
            StepStatus::Done => "x",
            StepStatus::Error => "!",
        };
        out.push(format!("  [{}] {:<18} {}", marker, step.title, step.description));
    }
    out.extend(state.log_tail(log_tail).iter().map(log_line));
    out.join("\n")
}

/// `HH:MM:SS  LEVEL    | message`, in local time.
pub fn log_line(entry: &LogEntry) -> String {
    format!(
        "{}  {:<7} | {}",
        entry.timestamp.with_timezone(&Local).format("%H:%M:%S"),
        entry.level.to_string(),
        entry.message
    )
}

fn progress_bar(progress: f64) -> String {
    let filled = ((progress.clamp(0.0, 1.0) * BAR_WIDTH as f64) as usize).min(BAR_WIDTH);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

/// Tracks which log entries have already been printed.
///
/// Start and reset clear the log, so the cursor rewinds whenever the run id
/// changes or the log shrinks.
#[derive(Debug, Default)]
pub struct LogCursor {
    printed: usize,
    run_id: Option<Uuid>,
}

impl LogCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries appended since the previous call.
    pub fn unseen<'a>(&mut self, state: &'a WorkflowState) -> &'a [LogEntry] {
        if state.run_id != self.run_id || state.log.len() < self.printed {
            self.printed = 0;
            self.run_id = state.run_id;
        }
        let fresh = &state.log[self.printed..];
        self.printed = state.log.len();
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use workflow_runner::{LogLevel, PipelineDefinition, WorkflowRunner};

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0.0), format!("[{}]", "-".repeat(BAR_WIDTH)));
        assert_eq!(progress_bar(1.0), format!("[{}]", "#".repeat(BAR_WIDTH)));
        assert_eq!(progress_bar(0.5).matches('#').count(), BAR_WIDTH / 2);
    }

    #[test]
    fn test_status_line_idle() {
        let runner = WorkflowRunner::manual(PipelineDefinition::default());
        let line = status_line(&runner.current_state());
        assert!(line.starts_with("[Idle     ]"));
        assert!(line.contains("0/3 steps"));
        assert!(!line.contains("Story Creation"));
    }

    #[test]
    fn test_status_line_running_names_current_step() {
        let runner = WorkflowRunner::manual(PipelineDefinition::default());
        runner.start().unwrap();
        runner.tick(Duration::from_millis(4500));

        let line = status_line(&runner.current_state());
        assert!(line.starts_with("[Running  ]"));
        assert!(line.contains(" 50%"));
        assert!(line.contains("1/3 steps"));
        assert!(line.ends_with("Video Generation"));
    }

    #[test]
    fn test_status_line_after_reset_omits_step() {
        let runner = WorkflowRunner::manual(PipelineDefinition::default());
        runner.start().unwrap();
        runner.tick(Duration::from_secs(4));
        runner.reset();

        let line = status_line(&runner.current_state());
        assert!(line.starts_with("[Idle     ]"));
        assert!(line.ends_with("0/3 steps"));
    }

    #[test]
    fn test_status_line_failed_run_names_failed_step() {
        let runner = WorkflowRunner::manual(
            PipelineDefinition::default().with_failure_at("video_generation"),
        );
        runner.start().unwrap();
        runner.tick(Duration::from_secs(4));

        let line = status_line(&runner.current_state());
        assert!(line.starts_with("[Error    ]"));
        assert!(line.ends_with("Video Generation"));
    }

    #[test]
    fn test_log_line_format() {
        let entry = LogEntry::new(LogLevel::Success, "Story Creation completed.");
        let line = log_line(&entry);
        assert!(line.ends_with("SUCCESS | Story Creation completed."));
    }

    #[test]
    fn test_dashboard_marks_steps() {
        let runner = WorkflowRunner::manual(
            PipelineDefinition::default().with_failure_at("video_generation"),
        );
        runner.start().unwrap();
        runner.tick(Duration::from_secs(4));

        let text = dashboard(&runner.current_state(), Utc::now(), 2);
        assert!(text.contains("[x] Story Creation"));
        assert!(text.contains("[!] Video Generation"));
        assert!(text.contains("[ ] File Download"));
        assert!(text.contains("less than a minute"));
        assert!(text.ends_with("Video Generation failed."));
    }

    #[test]
    fn test_cursor_yields_only_new_entries() {
        let runner = WorkflowRunner::manual(PipelineDefinition::default());
        let mut cursor = LogCursor::new();

        runner.start().unwrap();
        assert_eq!(cursor.unseen(&runner.current_state()).len(), 2);
        assert!(cursor.unseen(&runner.current_state()).is_empty());

        runner.tick(Duration::from_secs(3));
        assert_eq!(cursor.unseen(&runner.current_state()).len(), 2);

        runner.reset();
        assert!(cursor.unseen(&runner.current_state()).is_empty());

        runner.start().unwrap();
        let fresh = runner.current_state();
        let lines = cursor.unseen(&fresh);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].message, "Initializing ChatGPT API connection");
    }
}
