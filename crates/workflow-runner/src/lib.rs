//! Workflow Runner
//!
//! Drives a simulated multi-step pipeline (story creation, video generation,
//! file download) and reports its state to whatever renders it.
//!
//! This crate provides:
//! - Workflow state model and immutable snapshots
//! - Deterministic step-advancing state machine with failure injection
//! - Thread-safe runner with background or manual scheduling
//! - Observer callbacks and a watch channel for state changes
//! - Environment-based configuration

pub mod config;
pub mod error;
pub mod observer;
pub mod pipeline;
pub mod runner;
pub mod state;

pub use config::RunnerConfig;
pub use error::{ConfigError, RunnerError, RunnerResult};
pub use observer::{ObserverId, StateCallback};
pub use pipeline::{Pipeline, PipelineDefinition, StepDefinition};
pub use runner::{Scheduling, WorkflowRunner};
pub use state::{
    LogEntry, LogLevel, StepRecord, StepStatus, WorkflowPhase, WorkflowSnapshot, WorkflowState,
};
