//! Robust, decoupled logging pipeline for ROM builds.
//!
//! # Architecture
//!
//! ```text
//! log::* macros / tool output
//!     |
//! [LogCollector] (non-blocking send)
//!     | (crossbeam unbounded channel)
//!     v
//! [DiskPersister thread] ----> console echo (level filtered)
//!     |
//! logs/full/<ts>_full.log      every line
//! logs/parsed/<ts>_parsed.log  milestones and diagnostics (target "parsed")
//! ```
//!
//! Disk writes happen on a plain OS thread, so logging works from any tokio
//! runtime (or none) and never blocks the build.

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{Level, LevelFilter, Log, Metadata, Record};
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

/// A log line with metadata
#[derive(Clone, Debug)]
pub struct LogLine {
    /// The actual log message
    pub message: String,
    /// Log type: "full" or "parsed"
    pub log_type: String,
    /// Timestamp of when the log was created
    pub timestamp: String,
    pub level: Level,
}

impl LogLine {
    pub fn new(message: String) -> Self {
        LogLine::with_level(message, Level::Info)
    }

    pub fn with_level(message: String, level: Level) -> Self {
        LogLine {
            message,
            log_type: "full".to_string(),
            timestamp: Local::now().format("%H:%M:%S%.3f").to_string(),
            level,
        }
    }

    fn is_parsed(&self) -> bool {
        self.log_type == "parsed"
    }
}

/// Unified logger that persists to disk and optionally echoes to the console
#[derive(Clone)]
pub struct LogCollector {
    /// Channel sender for log lines (internal)
    tx: Sender<LogMessage>,
    full_log_path: PathBuf,
    parsed_log_path: PathBuf,
}

impl LogCollector {
    /// Create a new LogCollector with a background disk persister.
    ///
    /// Lines at or above `echo_level` are also written to stderr.
    pub fn new(log_dir: PathBuf, echo_level: LevelFilter) -> Result<Self, String> {
        let full_log_dir = log_dir.join("full");
        let parsed_log_dir = log_dir.join("parsed");
        std::fs::create_dir_all(&full_log_dir)
            .map_err(|e| format!("Failed to create full log dir: {}", e))?;
        std::fs::create_dir_all(&parsed_log_dir)
            .map_err(|e| format!("Failed to create parsed log dir: {}", e))?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S%.3f");
        let full_log_path = full_log_dir.join(format!("{}_full.log", stamp));
        let parsed_log_path = parsed_log_dir.join(format!("{}_parsed.log", stamp));

        let mut full_file = open_append(&full_log_path)?;
        let mut parsed_file = open_append(&parsed_log_path)?;

        let (tx, rx) = unbounded::<LogMessage>();

        std::thread::spawn(move || {
            while let Ok(msg) = rx.recv() {
                match msg {
                    LogMessage::Line(line) => {
                        let formatted = format!("[{}] {}\n", line.timestamp, line.message);
                        let _ = full_file.write_all(formatted.as_bytes());
                        if line.is_parsed() {
                            let _ = parsed_file.write_all(formatted.as_bytes());
                        }
                        if line.level <= echo_level {
                            eprintln!("{}", line.message);
                        }
                    }
                    LogMessage::Flush(done) => {
                        let _ = full_file.flush();
                        let _ = parsed_file.flush();
                        let _ = done.send(());
                    }
                }
            }
        });

        Ok(LogCollector {
            tx,
            full_log_path,
            parsed_log_path,
        })
    }

    /// Register a clone of this collector as the global `log` backend.
    pub fn install(&self, max_level: LevelFilter) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(self.clone()))?;
        log::set_max_level(max_level);
        Ok(())
    }

    pub fn full_log_path(&self) -> &Path {
        &self.full_log_path
    }

    pub fn parsed_log_path(&self) -> &Path {
        &self.parsed_log_path
    }

    /// Send a log line (non-blocking)
    pub fn log(&self, line: LogLine) {
        let _ = self.tx.send(LogMessage::Line(line));
    }

    /// Send a simple string log
    pub fn log_str(&self, message: impl Into<String>) {
        self.log(LogLine::new(message.into()));
    }

    /// Wait for all pending logs to be written to disk.
    ///
    /// Sends a FLUSH marker down the channel and waits for the background
    /// thread to reach it, so everything logged before the call is on disk.
    pub async fn wait_for_empty(&self) -> Result<(), String> {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        self.tx
            .send(LogMessage::Flush(tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;

        tokio::task::spawn_blocking(move || rx.recv())
            .await
            .map_err(|e| format!("Flush waiter failed: {}", e))?
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }
}

fn open_append(path: &Path) -> Result<File, String> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))
}

/// Implementation of the `log` crate's Log trait
/// Wires all log::info!(), log::warn!(), log::error!() calls into LogCollector
impl Log for LogCollector {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let message = format!("[{}] {}", record.level(), record.args());
            let mut line = LogLine::with_level(message, record.level());

            // Target-aware routing: "parsed" marks high-level milestones
            if record.target() == "parsed" {
                line.log_type = "parsed".to_string();
            }
            LogCollector::log(self, line);
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_log_collector_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("logs");

        let collector = LogCollector::new(log_dir.clone(), LevelFilter::Off).unwrap();

        assert!(log_dir.join("full").is_dir());
        assert!(log_dir.join("parsed").is_dir());
        assert!(collector.full_log_path().exists());
        assert!(collector.parsed_log_path().exists());
    }

    #[tokio::test]
    async fn test_parsed_lines_reach_both_files() {
        let temp_dir = TempDir::new().unwrap();
        let collector = LogCollector::new(temp_dir.path().to_path_buf(), LevelFilter::Off).unwrap();

        collector.log_str("ca65 main.s -o build/main.o");
        Log::log(
            &collector,
            &Record::builder()
                .args(format_args!("Assembly complete"))
                .level(Level::Info)
                .target("parsed")
                .build(),
        );
        collector.wait_for_empty().await.unwrap();

        let full = fs::read_to_string(collector.full_log_path()).unwrap();
        let parsed = fs::read_to_string(collector.parsed_log_path()).unwrap();
        assert!(full.contains("ca65 main.s -o build/main.o"));
        assert!(full.contains("Assembly complete"));
        assert!(parsed.contains("Assembly complete"));
        assert!(!parsed.contains("ca65 main.s"));
    }

    #[tokio::test]
    async fn test_log_trait_routes_parsed_target() {
        let temp_dir = TempDir::new().unwrap();
        let collector = LogCollector::new(temp_dir.path().to_path_buf(), LevelFilter::Off).unwrap();

        Log::log(
            &collector,
            &Record::builder()
                .args(format_args!("Linked rom.nes"))
                .level(Level::Info)
                .target("parsed")
                .build(),
        );
        collector.wait_for_empty().await.unwrap();

        let parsed = fs::read_to_string(collector.parsed_log_path()).unwrap();
        assert!(parsed.contains("[INFO] Linked rom.nes"));
    }

    #[tokio::test]
    async fn test_log_collector_non_blocking() {
        let temp_dir = TempDir::new().unwrap();
        let collector = LogCollector::new(temp_dir.path().to_path_buf(), LevelFilter::Off).unwrap();

        for i in 0..1000 {
            collector.log_str(format!("Log message {}", i));
        }
        collector.wait_for_empty().await.unwrap();

        let full = fs::read_to_string(collector.full_log_path()).unwrap();
        assert_eq!(full.lines().count(), 1000);
    }
}
