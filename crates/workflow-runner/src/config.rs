//! Runner configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::pipeline::PipelineDefinition;
use crate::runner::Scheduling;

/// Runner configuration loaded from environment variables.
///
/// Environment variables are prefixed with `WORKFLOW_`:
/// - `WORKFLOW_STEP_DURATION_MS`: Simulated duration of each step (default: 3000)
/// - `WORKFLOW_TICK_INTERVAL_MS`: Background driver cadence (default: 60)
/// - `WORKFLOW_FAIL_AT_STEP`: Step id that fails on entry (optional)
/// - `WORKFLOW_LOG_TAIL`: Log lines kept on screen by renderers (default: 400)
/// - `WORKFLOW_BACKGROUND`: Advance on a background task (default: true)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunnerConfig {
    /// Simulated duration of each step in milliseconds
    #[serde(default = "default_step_duration_ms")]
    pub step_duration_ms: u64,

    /// Background tick interval in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Step id to fail on entry
    #[serde(default)]
    pub fail_at_step: Option<String>,

    /// Number of log lines a renderer shows
    #[serde(default = "default_log_tail")]
    pub log_tail: usize,

    /// Spawn a background driver on start
    #[serde(default = "default_true")]
    pub background: bool,
}

fn default_step_duration_ms() -> u64 {
    3000
}

fn default_tick_interval_ms() -> u64 {
    60
}

fn default_log_tail() -> usize {
    400
}

fn default_true() -> bool {
    true
}

impl RunnerConfig {
    /// Load and validate configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Load and validate configuration from explicit key/value pairs.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::prefixed("WORKFLOW_").from_iter::<_, RunnerConfig>(vars)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and that the failure target names a known step.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "tick_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }

        if let Some(step_id) = self.failure_target() {
            if !self.pipeline_steps().contains_step(step_id) {
                return Err(ConfigError::UnknownStep(step_id.to_string()));
            }
        }
        Ok(())
    }

    pub fn step_duration(&self) -> Duration {
        Duration::from_millis(self.step_duration_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Build the pipeline definition described by this configuration.
    pub fn pipeline(&self) -> PipelineDefinition {
        let definition = self.pipeline_steps();
        match self.failure_target() {
            Some(step_id) => definition.with_failure_at(step_id),
            None => definition,
        }
    }

    pub fn scheduling(&self) -> Scheduling {
        if self.background {
            Scheduling::Background {
                tick_interval: self.tick_interval(),
            }
        } else {
            Scheduling::Manual
        }
    }

    fn pipeline_steps(&self) -> PipelineDefinition {
        PipelineDefinition::story_to_video(self.step_duration())
    }

    // An empty WORKFLOW_FAIL_AT_STEP means no failure.
    fn failure_target(&self) -> Option<&str> {
        self.fail_at_step
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            step_duration_ms: default_step_duration_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            fail_at_step: None,
            log_tail: default_log_tail(),
            background: true,
        }
    }
}
