//! Interactive console: the Start/Stop/Reset controls as stdin commands.

use anyhow::Result;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use workflow_runner::WorkflowRunner;

use crate::render::{self, LogCursor};

/// A parsed console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Reset,
    Status,
    Help,
    Quit,
}

impl Command {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "start" | "s" => Some(Self::Start),
            "stop" | "x" => Some(Self::Stop),
            "reset" | "r" => Some(Self::Reset),
            "status" | "" => Some(Self::Status),
            "help" | "?" => Some(Self::Help),
            "quit" | "exit" | "q" => Some(Self::Quit),
            _ => None,
        }
    }
}

const HELP: &str = "commands: start | stop | reset | status | help | quit";

/// Run the console until `quit` or end of input.
pub async fn run(runner: WorkflowRunner, log_tail: usize) -> Result<()> {
    let mut updates = runner.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut cursor = LogCursor::new();

    println!("{}", render::dashboard(&runner.current_state(), Utc::now(), log_tail));
    println!("{HELP}");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::debug!("Console input closed");
                    break;
                };
                match Command::parse(&line) {
                    Some(Command::Quit) => break,
                    Some(command) => execute(&runner, command, log_tail),
                    None => println!("unknown command: {}  ({HELP})", line.trim()),
                }
            }
            changed = updates.changed() => {
                changed?;
                let snapshot = updates.borrow_and_update().clone();
                for entry in cursor.unseen(&snapshot) {
                    println!("{}", render::log_line(entry));
                }
                println!("{}", render::status_line(&snapshot));
            }
        }
    }

    if runner.stop().is_ok() {
        tracing::info!("Stopped running workflow on exit");
    }
    Ok(())
}

fn execute(runner: &WorkflowRunner, command: Command, log_tail: usize) {
    let result = match command {
        Command::Start => runner.start(),
        Command::Stop => runner.stop(),
        Command::Reset => {
            runner.reset();
            Ok(())
        }
        Command::Status => {
            println!("{}", render::dashboard(&runner.current_state(), Utc::now(), log_tail));
            Ok(())
        }
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Quit => Ok(()),
    };

    if let Err(e) = result {
        tracing::debug!(command = ?command, error = %e, "Command ignored");
        println!("ignored: {e}");
    }
}
