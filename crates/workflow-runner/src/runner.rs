//! Workflow runner: the synchronized owner of the pipeline state.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::RunnerConfig;
use crate::error::{ConfigError, RunnerError, RunnerResult};
use crate::observer::{ObserverId, Observers};
use crate::pipeline::{Pipeline, PipelineDefinition};
use crate::state::WorkflowSnapshot;

/// How the pipeline is advanced while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduling {
    /// The host calls `tick` from its own loop.
    Manual,
    /// `start()` spawns a Tokio task that ticks at a fixed cadence.
    Background { tick_interval: Duration },
}

/// Everything guarded by the state lock.
struct Core {
    pipeline: Pipeline,
    sequence: u64,
    /// Bumped by start, stop and reset. A background driver only mutates
    /// state while the generation it was spawned with is still current.
    generation: u64,
}

impl Core {
    fn current(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            sequence: self.sequence,
            state: self.pipeline.state().clone(),
        }
    }

    fn publish(&mut self) -> WorkflowSnapshot {
        self.sequence += 1;
        self.current()
    }
}

struct Shared {
    core: Mutex<Core>,
    observers: Observers,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publish the mutation held by `core` and deliver it to observers.
    ///
    /// The registry is locked before the state lock is released, so
    /// deliveries happen in sequence order and none is skipped.
    fn commit(&self, mut core: MutexGuard<'_, Core>) {
        let snapshot = core.publish();
        let delivery = self.observers.delivery();
        drop(core);
        delivery.deliver(snapshot);
    }

    /// One background tick. Returns `false` once the driver should exit.
    fn advance(&self, generation: u64, elapsed: Duration) -> bool {
        let mut core = self.lock();
        if core.generation != generation || !core.pipeline.is_running() {
            return false;
        }
        let changed = core.pipeline.tick(elapsed);
        let running = core.pipeline.is_running();
        if changed {
            self.commit(core);
        }
        running
    }
}

/// Owns the workflow state and drives it through its steps.
///
/// Cloning yields another handle to the same runner.
#[derive(Clone)]
pub struct WorkflowRunner {
    shared: Arc<Shared>,
    scheduling: Scheduling,
}

impl WorkflowRunner {
    /// Create a runner for the given pipeline.
    pub fn new(definition: PipelineDefinition, scheduling: Scheduling) -> Self {
        let core = Core {
            pipeline: Pipeline::new(definition),
            sequence: 0,
            generation: 0,
        };
        let observers = Observers::new(core.current());
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(core),
                observers,
            }),
            scheduling,
        }
    }

    /// Create a runner advanced only by explicit `tick` calls.
    pub fn manual(definition: PipelineDefinition) -> Self {
        Self::new(definition, Scheduling::Manual)
    }

    /// Create a runner from validated configuration.
    pub fn from_config(config: &RunnerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config.pipeline(), config.scheduling()))
    }

    pub fn scheduling(&self) -> Scheduling {
        self.scheduling
    }

    /// Start a new run.
    ///
    /// In background mode this must be called from within a Tokio runtime,
    /// and the tick interval must be non-zero.
    pub fn start(&self) -> RunnerResult<()> {
        let runtime = match self.scheduling {
            Scheduling::Manual => None,
            Scheduling::Background { tick_interval } if tick_interval.is_zero() => {
                return Err(RunnerError::ZeroTickInterval);
            }
            Scheduling::Background { tick_interval } => {
                let handle = Handle::try_current().map_err(|_| RunnerError::NoRuntime)?;
                Some((handle, tick_interval))
            }
        };

        let mut core = self.shared.lock();
        core.pipeline.start()?;
        core.generation += 1;
        let generation = core.generation;
        self.shared.commit(core);

        if let Some((handle, tick_interval)) = runtime {
            handle.spawn(drive(self.shared.clone(), generation, tick_interval));
        }
        Ok(())
    }

    /// Stop the current run.
    pub fn stop(&self) -> RunnerResult<()> {
        let mut core = self.shared.lock();
        core.pipeline.stop()?;
        core.generation += 1;
        self.shared.commit(core);
        Ok(())
    }

    /// Return to the initial state. Any active driver exits without further writes.
    pub fn reset(&self) {
        let mut core = self.shared.lock();
        core.pipeline.reset();
        core.generation += 1;
        self.shared.commit(core);
    }

    /// Advance simulated time by `elapsed`. No-op unless running.
    pub fn tick(&self, elapsed: Duration) {
        let mut core = self.shared.lock();
        if core.pipeline.tick(elapsed) {
            self.shared.commit(core);
        }
    }

    /// Deep copy of the current state.
    pub fn current_state(&self) -> WorkflowSnapshot {
        self.shared.lock().current()
    }

    /// Register a callback invoked after every state change.
    ///
    /// The callback runs on whichever thread made the change and must not
    /// call back into the runner synchronously; use `subscribe` for that.
    pub fn on_state_changed<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&WorkflowSnapshot) + Send + Sync + 'static,
    {
        self.shared.observers.register(Arc::new(callback))
    }

    /// Remove a previously registered callback.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.shared.observers.remove(id)
    }

    /// Watch channel always holding the latest delivered snapshot.
    pub fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.shared.observers.subscribe()
    }
}

impl std::fmt::Debug for WorkflowRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.shared.lock();
        f.debug_struct("WorkflowRunner")
            .field("scheduling", &self.scheduling)
            .field("phase", &core.pipeline.state().phase)
            .field("sequence", &core.sequence)
            .finish()
    }
}

/// Background driver for one run.
async fn drive(shared: Arc<Shared>, generation: u64, tick_interval: Duration) {
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(generation, tick_ms = tick_interval.as_millis() as u64, "Driver started");

    let mut last = Instant::now();
    loop {
        ticker.tick().await;
        let now = Instant::now();
        let elapsed = now.duration_since(last);
        last = now;

        if !shared.advance(generation, elapsed) {
            break;
        }
    }

    tracing::debug!(generation, "Driver exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::WorkflowPhase;

    #[test]
    fn test_manual_runner_starts_idle() {
        let runner = WorkflowRunner::manual(PipelineDefinition::default());
        let snapshot = runner.current_state();
        assert_eq!(snapshot.sequence, 0);
        assert_eq!(snapshot.phase, WorkflowPhase::Idle);
        assert_eq!(runner.scheduling(), Scheduling::Manual);
    }

    #[test]
    fn test_background_start_without_runtime_has_no_effect() {
        let runner = WorkflowRunner::new(
            PipelineDefinition::default(),
            Scheduling::Background {
                tick_interval: Duration::from_millis(10),
            },
        );

        assert_eq!(runner.start(), Err(RunnerError::NoRuntime));
        let snapshot = runner.current_state();
        assert_eq!(snapshot.phase, WorkflowPhase::Idle);
        assert_eq!(snapshot.sequence, 0);
    }

    #[test]
    fn test_zero_tick_interval_is_rejected_before_start() {
        let runner = WorkflowRunner::new(
            PipelineDefinition::default(),
            Scheduling::Background {
                tick_interval: Duration::ZERO,
            },
        );

        assert_eq!(runner.start(), Err(RunnerError::ZeroTickInterval));
        let snapshot = runner.current_state();
        assert_eq!(snapshot.phase, WorkflowPhase::Idle);
        assert_eq!(snapshot.sequence, 0);
        assert!(snapshot.log.is_empty());
    }

    #[test]
    fn test_sequence_advances_per_mutation() {
        let runner = WorkflowRunner::manual(PipelineDefinition::default());
        runner.start().unwrap();
        runner.tick(Duration::from_millis(500));
        runner.tick(Duration::ZERO);
        runner.stop().unwrap();

        // start, first tick, stop; the zero tick changed nothing
        assert_eq!(runner.current_state().sequence, 3);
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let config = RunnerConfig {
            fail_at_step: Some("nope".to_string()),
            ..RunnerConfig::default()
        };
        assert!(matches!(
            WorkflowRunner::from_config(&config),
            Err(ConfigError::UnknownStep(_))
        ));
    }
}
