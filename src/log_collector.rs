//! Process-wide append-only log for switch attempts and tool resolution.
//!
//! # Architecture
//!
//! ```text
//! log::info!() / log_parsed!()
//!     |
//! [LogCollector] (log::Log impl, non-blocking)
//!     | (crossbeam unbounded channel)
//!     v
//! [writer thread] --> prime-switch.log  (every record)
//!                 --> stderr            (milestones and warnings)
//! ```
//!
//! Records are formatted on the calling thread and written by a dedicated OS
//! thread, so logging from the single-threaded controller never blocks on
//! disk. `flush()` waits until everything sent before it has been written.

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{Level, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Internal log line or special marker
enum LogMessage {
    /// Regular log line
    Line(LogLine),
    /// Flush marker with channel sender to signal completion
    Flush(std::sync::mpsc::Sender<()>),
}

/// Get the default log file path: ~/.local/state/prime-switch/prime-switch.log
pub fn get_global_log_path() -> Result<PathBuf, String> {
    let base = dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/state")))
        .ok_or_else(|| "Cannot determine state directory".to_string())?;
    Ok(base.join("prime-switch").join("prime-switch.log"))
}

/// A log line with metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    /// The actual log message
    pub message: String,
    /// Record target; "parsed" marks high-level milestones
    pub target: String,
    pub level: Level,
    /// Timestamp of when the log was created
    pub timestamp: String,
}

impl LogLine {
    pub fn new(level: Level, target: impl Into<String>, message: impl Into<String>) -> Self {
        LogLine {
            message: message.into(),
            target: target.into(),
            level,
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        }
    }

    /// Milestones and anything at warning level or above reach stderr.
    pub fn is_journal_worthy(&self) -> bool {
        self.target == "parsed" || self.level <= Level::Warn
    }

    pub fn format(&self) -> String {
        format!("[{}] [{}] [{}] {}", self.timestamp, self.level, self.target, self.message)
    }
}

fn open_append(path: &Path) -> Result<File, String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create log directory: {}", e))?;
        }
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))
}

/// Logger that appends to a file on a background thread
pub struct LogCollector {
    /// Channel sender for log lines - crossbeam unbounded so callers never block
    tx: Sender<LogMessage>,
    path: PathBuf,
    level: log::LevelFilter,
    mirror_to_stderr: bool,
}

impl LogCollector {
    /// Open (or create) `path` for appending and start the writer thread.
    pub fn new(path: PathBuf, level: log::LevelFilter) -> Result<Self, String> {
        let mut file = open_append(&path)?;
        let (tx, rx) = unbounded::<LogMessage>();

        std::thread::Builder::new()
            .name("prime-switch-log".to_string())
            .spawn(move || {
                while let Ok(msg) = rx.recv() {
                    match msg {
                        LogMessage::Line(line) => {
                            let formatted = format!("{}\n", line.format());
                            let _ = file.write_all(formatted.as_bytes());
                            let _ = file.flush();
                        }
                        LogMessage::Flush(done) => {
                            let _ = file.flush();
                            let _ = done.send(());
                        }
                    }
                }
            })
            .map_err(|e| format!("Failed to spawn log writer: {}", e))?;

        Ok(LogCollector {
            tx,
            path,
            level,
            mirror_to_stderr: true,
        })
    }

    /// Disable the stderr mirror (tests, quiet CLI output).
    pub fn without_stderr(mut self) -> Self {
        self.mirror_to_stderr = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register as the global `log` logger.
    pub fn install(self) -> Result<(), String> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self))
            .map(|()| log::set_max_level(level))
            .map_err(|e| format!("Failed to set global logger: {}", e))
    }

    /// Send a log line (non-blocking)
    pub fn log_line(&self, line: LogLine) {
        if self.mirror_to_stderr && line.is_journal_worthy() {
            eprintln!("[prime-switch] {}", line.message);
        }
        let _ = self.tx.send(LogMessage::Line(line));
    }

    /// Wait for all pending lines to be written.
    pub fn wait_for_empty(&self) -> Result<(), String> {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        self.tx
            .send(LogMessage::Flush(tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;
        rx.recv()
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }
}

impl Clone for LogCollector {
    fn clone(&self) -> Self {
        LogCollector {
            tx: self.tx.clone(),
            path: self.path.clone(),
            level: self.level,
            mirror_to_stderr: self.mirror_to_stderr,
        }
    }
}

/// Implementation of the `log` crate's Log trait
/// Wires all log::info!(), log::warn!(), log::error!() calls into LogCollector
impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.log_line(LogLine::new(
                record.level(),
                record.target(),
                record.args().to_string(),
            ));
        }
    }

    fn flush(&self) {
        let _ = self.wait_for_empty();
    }
}
