/// System module: argv-only command execution and tool resolution

pub mod resolver;

use crate::models::ProcessOutput;
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::process::Command;
use std::rc::Rc;

pub use resolver::{CommandResolver, ToolSet, WhichResolver};

/// Logging macros for convenient access
/// Use the log crate directly for target-aware routing
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        log::info!("{}", msg);
    }}
}

#[macro_export]
macro_rules! log_parsed {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        // Use target="parsed" for high-level events
        log::info!(target: "parsed", "{}", msg);
    }}
}

/// Completion callback for [`ProcessExecutor::run_async`].
pub type OnComplete = Box<dyn FnOnce(ProcessOutput) + 'static>;

/// Runs external commands.
///
/// Command lines are split on whitespace into an argument vector and executed
/// directly, never through a shell, so profile names embedded in a command
/// line cannot inject anything.
pub trait ProcessExecutor {
    /// Run to completion, blocking the calling thread.
    ///
    /// Only for short idempotent queries (`prime-select query`, `nvidia-smi -L`).
    fn run_sync(&self, command_line: &str) -> ProcessOutput;

    /// Spawn without blocking and call `on_complete` exactly once when the
    /// process exits, on the scheduling thread. A spawn failure still calls
    /// `on_complete`, with status `-1` and the reason in `stderr`.
    fn run_async(&self, command_line: &str, on_complete: OnComplete);
}

/// Split a command line into an argv by whitespace.
pub fn split_command_line(command_line: &str) -> Vec<String> {
    command_line.split_whitespace().map(str::to_string).collect()
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    // Signal-terminated processes have no code; report them like a failed spawn.
    status.code().unwrap_or(-1)
}

fn collect_output(command_line: &str, output: std::process::Output) -> ProcessOutput {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !stdout.is_empty() {
        log::debug!("[{}] stdout: {}", command_line, stdout.trim_end());
    }
    if !stderr.is_empty() {
        log::debug!("[{}] stderr: {}", command_line, stderr.trim_end());
    }

    ProcessOutput {
        status: exit_code(output.status),
        stdout,
        stderr,
    }
}

/// Default production implementation of ProcessExecutor
///
/// Synchronous runs use `std::process::Command`; asynchronous runs use
/// `tokio::process::Command` driven by a task spawned with
/// `tokio::task::spawn_local`, so `run_async` must be called from inside a
/// `tokio::task::LocalSet`. The callback then runs on that same thread.
/// Called anywhere else, `run_async` spawns nothing and reports a spawn
/// failure to the callback straight away.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl SystemExecutor {
    pub fn new() -> Self {
        SystemExecutor
    }
}

impl ProcessExecutor for SystemExecutor {
    fn run_sync(&self, command_line: &str) -> ProcessOutput {
        let argv = split_command_line(command_line);
        let Some((program, args)) = argv.split_first() else {
            return ProcessOutput::spawn_failed("empty command line");
        };

        match Command::new(program).args(args).output() {
            Ok(output) => collect_output(command_line, output),
            Err(e) => {
                log::debug!("[{}] spawn failed: {}", command_line, e);
                ProcessOutput::spawn_failed(format!("Failed to execute {}: {}", program, e))
            }
        }
    }

    fn run_async(&self, command_line: &str, on_complete: OnComplete) {
        if tokio::runtime::Handle::try_current().is_err() {
            log::warn!("[{}] not spawned: no tokio runtime on this thread", command_line);
            on_complete(ProcessOutput::spawn_failed("no tokio runtime on this thread"));
            return;
        }

        let command_line = command_line.to_string();
        let argv = split_command_line(&command_line);

        // Shared with the task so the callback survives a failed hand-off.
        let slot: Rc<Cell<Option<OnComplete>>> = Rc::new(Cell::new(Some(on_complete)));
        let task_slot = Rc::clone(&slot);
        let task_command = command_line.clone();

        // spawn_local panics outside a LocalSet.
        let spawned = catch_unwind(AssertUnwindSafe(move || {
            tokio::task::spawn_local(async move {
                let result = match argv.split_first() {
                    None => ProcessOutput::spawn_failed("empty command line"),
                    Some((program, args)) => {
                        match tokio::process::Command::new(program).args(args).output().await {
                            Ok(output) => collect_output(&task_command, output),
                            Err(e) => {
                                log::debug!("[{}] spawn failed: {}", task_command, e);
                                ProcessOutput::spawn_failed(format!(
                                    "Failed to execute {}: {}",
                                    program, e
                                ))
                            }
                        }
                    }
                };

                if let Some(on_complete) = task_slot.take() {
                    on_complete(result);
                }
            })
        }));

        if spawned.is_err() {
            log::warn!("[{}] not spawned: no tokio LocalSet on this thread", command_line);
            if let Some(on_complete) = slot.take() {
                on_complete(ProcessOutput::spawn_failed("no tokio LocalSet on this thread"));
            }
        }
    }
}
