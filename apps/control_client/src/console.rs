use std::{io::BufRead, thread};

use orchestrator::{validate_operator_command, ControlOrchestrator, OperatorInputError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub const PROMPT: &str =
    "Enter Shutdown, ChangeControlState;<1-5> or SkillRecipe;<name>. Enter \"exit\" to quit.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleAction {
    Exit,
    Push(String),
    Reject(OperatorInputError),
}

pub fn interpret_line(line: &str) -> ConsoleAction {
    let line = line.trim();
    if line.eq_ignore_ascii_case("exit") {
        return ConsoleAction::Exit;
    }
    match validate_operator_command(line) {
        Ok(_) => ConsoleAction::Push(line.to_string()),
        Err(err) => ConsoleAction::Reject(err),
    }
}

/// Reads stdin on a plain thread; a blocked read must not hold up runtime
/// shutdown.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
        debug!("stdin closed");
    });
    rx
}

/// Runs operator commands until `exit` or end of input. Without an
/// orchestrator (monitor-only mode) commands are refused.
pub async fn run_console(
    mut lines: mpsc::UnboundedReceiver<String>,
    orchestrator: Option<&ControlOrchestrator>,
) {
    println!("{PROMPT}");
    while let Some(line) = lines.recv().await {
        match interpret_line(&line) {
            ConsoleAction::Exit => break,
            ConsoleAction::Push(command) => match orchestrator {
                Some(orchestrator) => orchestrator.user_input(&command),
                None => println!("Monitor-only mode: commands are not accepted."),
            },
            ConsoleAction::Reject(OperatorInputError::Empty) => {}
            ConsoleAction::Reject(err) => {
                warn!(error = %err, "rejected operator command");
                println!("Invalid command: {err}");
            }
        }
    }
    if let Some(orchestrator) = orchestrator {
        orchestrator.shutdown();
    }
}
