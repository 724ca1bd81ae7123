//! Error types for the workflow runner.

use thiserror::Error;

/// Errors returned by runner commands.
///
/// None of these are fatal: a rejected command leaves the state untouched.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RunnerError {
    /// `start()` was called while a run is in progress.
    #[error("Workflow is already running")]
    AlreadyRunning,

    /// `stop()` was called while no run is in progress.
    #[error("Workflow is not running")]
    NotRunning,

    /// Background scheduling was requested outside a Tokio runtime.
    #[error("No Tokio runtime available for the background driver")]
    NoRuntime,

    /// Background scheduling was configured with a zero tick interval.
    #[error("Tick interval must be greater than zero")]
    ZeroTickInterval,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable parsing error.
    #[error("Environment error: {0}")]
    Env(#[from] envy::Error),

    /// A configured value is out of range.
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// The failure-injection target does not name a pipeline step.
    #[error("Unknown step id: {0}")]
    UnknownStep(String),
}

/// Result type alias using RunnerError.
pub type RunnerResult<T> = Result<T, RunnerError>;
