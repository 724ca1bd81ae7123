//! Workflow Monitor binary.
//!
//! Runs the simulated pipeline and renders its state as plain text.

mod console;
mod render;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use workflow_runner::{RunnerConfig, WorkflowRunner, WorkflowSnapshot};

use crate::render::LogCursor;

#[derive(Parser)]
#[command(name = "workflow-monitor")]
#[command(version, about = "Workflow monitor for the story-to-video pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Simulated duration of each step in milliseconds
    #[arg(long, global = true)]
    step_duration_ms: Option<u64>,

    /// Background tick interval in milliseconds
    #[arg(long = "tick-ms", global = true)]
    tick_interval_ms: Option<u64>,

    /// Step id that fails as soon as it is entered
    #[arg(long, global = true, value_name = "STEP_ID")]
    fail_at: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a run and print every state change until it ends
    Run {
        /// Press Stop after this many milliseconds
        #[arg(long)]
        stop_after_ms: Option<u64>,

        /// Print snapshots as JSON lines
        #[arg(short, long)]
        json: bool,
    },
    /// Interactive start/stop/reset console on stdin
    Console,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing; stdout is reserved for rendered output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,workflow_runner=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    tracing::info!(
        step_duration_ms = config.step_duration_ms,
        tick_interval_ms = config.tick_interval_ms,
        fail_at_step = ?config.fail_at_step,
        "Runner configuration loaded"
    );

    let runner = WorkflowRunner::from_config(&config).context("Invalid runner configuration")?;

    match cli.command {
        Commands::Run {
            stop_after_ms,
            json,
        } => run(runner, stop_after_ms.map(Duration::from_millis), json).await,
        Commands::Console => console::run(runner, config.log_tail).await,
    }
}

/// Environment configuration with command-line overrides applied.
fn load_config(cli: &Cli) -> Result<RunnerConfig> {
    let config = RunnerConfig::from_env().context("Failed to load configuration")?;
    apply_overrides(config, cli)
}

fn apply_overrides(mut config: RunnerConfig, cli: &Cli) -> Result<RunnerConfig> {
    anyhow::ensure!(
        config.background,
        "WORKFLOW_BACKGROUND=false is not supported: workflow-monitor always runs the background driver"
    );
    if let Some(ms) = cli.step_duration_ms {
        config.step_duration_ms = ms;
    }
    if let Some(ms) = cli.tick_interval_ms {
        config.tick_interval_ms = ms;
    }
    if let Some(step) = &cli.fail_at {
        config.fail_at_step = Some(step.clone());
    }
    Ok(config)
}

async fn run(runner: WorkflowRunner, stop_after: Option<Duration>, json: bool) -> Result<()> {
    let mut updates = runner.subscribe();
    runner.start()?;

    let stop_timer = async {
        match stop_after {
            Some(delay) => tokio::time::sleep(delay).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(stop_timer);

    let mut cursor = LogCursor::new();
    let mut stop_requested = false;
    loop {
        tokio::select! {
            changed = updates.changed() => {
                changed?;
                let snapshot = updates.borrow_and_update().clone();
                print_snapshot(&snapshot, &mut cursor, json)?;
                if snapshot.phase.is_terminal() {
                    break;
                }
            }
            _ = &mut stop_timer, if !stop_requested => {
                stop_requested = true;
                stop(&runner, "Stop timer elapsed");
            }
            _ = tokio::signal::ctrl_c(), if !stop_requested => {
                stop_requested = true;
                stop(&runner, "Shutdown signal received");
            }
        }
    }

    let last = runner.current_state();
    tracing::info!(
        phase = %last.phase,
        progress = last.overall_progress,
        steps = %last.steps_counter(),
        "Workflow finished"
    );
    Ok(())
}

fn stop(runner: &WorkflowRunner, reason: &str) {
    match runner.stop() {
        Ok(()) => tracing::info!(reason, "Stopping workflow"),
        Err(e) => tracing::debug!(reason, error = %e, "Stop ignored"),
    }
}

fn print_snapshot(snapshot: &WorkflowSnapshot, cursor: &mut LogCursor, json: bool) -> Result<()> {
    if json {
        println!("{}", snapshot.to_json()?);
        return Ok(());
    }
    for entry in cursor.unseen(snapshot) {
        println!("{}", render::log_line(entry));
    }
    println!("{}", render::status_line(snapshot));
    Ok(())
}
