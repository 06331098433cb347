//! Step execution: output directory preparation, input pre-flight, tool spawning
//! and output streaming.
//!
//! Integrates with the unified logging pipeline via LogCollector:
//! - Every tool output line is persisted verbatim to the full log
//! - Parsed diagnostics are echoed as milestones to the parsed log

use crate::error::BuildError;
use crate::models::{BuildConfig, ToolKind, ToolOutput};
use crate::toolchain::diagnostics::collect_diagnostics;
use crate::LogCollector;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Create the output directory. It must not already exist.
///
/// Only the final component is created; a missing parent is an error.
pub fn create_output_dir(path: &Path) -> Result<(), BuildError> {
    match std::fs::create_dir(path) {
        Ok(()) => {
            log::info!("[Build] [PREPARATION] Created output directory: {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(BuildError::OutputDirExists(path.to_path_buf()))
        }
        Err(source) => Err(BuildError::OutputDirCreate {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Report build inputs that are missing on disk.
///
/// Never fails: the tools are the authority on their inputs, this only
/// surfaces likely problems in the log before they run.
pub fn check_inputs(config: &BuildConfig) -> Vec<PathBuf> {
    let mut missing = Vec::new();

    if !config.working_dir.is_dir() {
        log::warn!(
            "[Build] [PREPARATION] Working directory not found: {}",
            config.working_dir.display()
        );
    }

    let inputs = config
        .sources
        .iter()
        .map(|unit| &unit.source)
        .chain(std::iter::once(&config.link_config));

    for input in inputs {
        let resolved = config.resolve(input);
        if !resolved.is_file() {
            log::warn!("[Build] [PREPARATION] Input not found: {}", resolved.display());
            missing.push(input.clone());
        }
    }

    missing
}

/// Spawns one external tool and captures everything it prints.
#[derive(Clone)]
pub struct ProcessRunner {
    program: String,
    extra_args: Vec<String>,
    working_dir: PathBuf,
    timeout: Option<Duration>,
    log_collector: Option<Arc<LogCollector>>,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        ProcessRunner {
            program: program.into(),
            extra_args: Vec::new(),
            working_dir: working_dir.into(),
            timeout: None,
            log_collector: None,
        }
    }

    /// Arguments placed before the step-specific ones.
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_log_collector(mut self, log_collector: Option<Arc<LogCollector>>) -> Self {
        self.log_collector = log_collector;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run the program with `args` appended to the configured extra arguments.
    ///
    /// A non-zero exit is not an error here; callers inspect
    /// [`ToolOutput::success`]. `Err` means the tool could not be run to
    /// completion at all.
    pub async fn run(&self, tool: ToolKind, args: Vec<String>) -> Result<ToolOutput, BuildError> {
        let mut full_args = self.extra_args.clone();
        full_args.extend(args);

        let mut command = Command::new(&self.program);
        command
            .args(&full_args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        log::info!("[Build] [{}] Starting {}", tool, self.program);

        let mut child = command.spawn().map_err(|source| BuildError::ToolSpawn {
            program: self.program.clone(),
            source,
        })?;

        let stdout = child.stdout.take().ok_or_else(|| self.io_error("stdout was not captured"))?;
        let stderr = child.stderr.take().ok_or_else(|| self.io_error("stderr was not captured"))?;

        let finished = async {
            let streams = self.stream_output(stdout, stderr).await?;
            let status = child.wait().await.map_err(|source| BuildError::ToolIo {
                program: self.program.clone(),
                source,
            })?;
            Ok::<_, BuildError>((streams, status))
        };

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, finished).await,
            None => Ok(finished.await),
        };

        let ((stdout_lines, stderr_lines), status) = match result {
            Ok(outcome) => outcome?,
            Err(_elapsed) => {
                if let Err(e) = child.kill().await {
                    log::warn!("[Build] [{}] Failed to kill {}: {}", tool, self.program, e);
                }
                return Err(BuildError::ToolTimeout {
                    program: self.program.clone(),
                    secs: self.timeout.map(|t| t.as_secs()).unwrap_or_default(),
                });
            }
        };

        let mut diagnostics = collect_diagnostics(&stderr_lines);
        diagnostics.extend(collect_diagnostics(&stdout_lines));

        for diagnostic in &diagnostics {
            if diagnostic.is_error() {
                log::error!(target: "parsed", "{}", diagnostic);
            } else {
                log::warn!(target: "parsed", "{}", diagnostic);
            }
        }

        let output = ToolOutput {
            tool,
            program: self.program.clone(),
            args: full_args,
            exit_code: status.code(),
            stdout: stdout_lines,
            stderr: stderr_lines,
            diagnostics,
        };

        let command_line = output.command_line();
        match output.exit_code {
            Some(0) => log::info!("[Build] [{}] {} finished", tool, command_line),
            Some(code) => log::warn!("[Build] [{}] {} exited with code {}", tool, command_line, code),
            None => log::warn!("[Build] [{}] {} terminated by signal", tool, command_line),
        }

        Ok(output)
    }

    /// Drain stdout and stderr until both close, persisting each line.
    async fn stream_output<O, E>(&self, stdout: O, stderr: E) -> Result<(Vec<String>, Vec<String>), BuildError>
    where
        O: AsyncRead + Unpin,
        E: AsyncRead + Unpin,
    {
        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut stdout_closed = false;
        let mut stderr_closed = false;
        let mut captured_out = Vec::new();
        let mut captured_err = Vec::new();

        while !(stdout_closed && stderr_closed) {
            tokio::select! {
                line_result = stdout_lines.next_line(), if !stdout_closed => {
                    match line_result.map_err(|source| self.stream_error(source))? {
                        Some(line) => {
                            self.persist(&line);
                            captured_out.push(line);
                        }
                        None => stdout_closed = true,
                    }
                }
                line_result = stderr_lines.next_line(), if !stderr_closed => {
                    match line_result.map_err(|source| self.stream_error(source))? {
                        Some(line) => {
                            self.persist(&format!("[STDERR] {}", line));
                            captured_err.push(line);
                        }
                        None => stderr_closed = true,
                    }
                }
            }
        }

        Ok((captured_out, captured_err))
    }

    fn persist(&self, line: &str) {
        match self.log_collector {
            Some(ref collector) => collector.log_str(format!("[{}] {}", self.program, line)),
            None => log::debug!("[{}] {}", self.program, line),
        }
    }

    fn stream_error(&self, source: io::Error) -> BuildError {
        BuildError::ToolIo {
            program: self.program.clone(),
            source,
        }
    }

    fn io_error(&self, message: &str) -> BuildError {
        self.stream_error(io::Error::new(io::ErrorKind::Other, message.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_output_dir_fresh() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("build");
        create_output_dir(&out).expect("fresh directory");
        assert!(out.is_dir());
    }

    #[test]
    fn test_create_output_dir_twice_fails() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("build");
        create_output_dir(&out).unwrap();
        match create_output_dir(&out) {
            Err(BuildError::OutputDirExists(path)) => assert_eq!(path, out),
            other => panic!("expected OutputDirExists, got {:?}", other),
        }
    }

    #[test]
    fn test_create_output_dir_missing_parent() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("missing").join("build");
        assert!(matches!(
            create_output_dir(&out),
            Err(BuildError::OutputDirCreate { .. })
        ));
    }

    #[test]
    fn test_check_inputs_lists_missing() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("main.s"), "; main\n").unwrap();
        std::fs::write(temp_dir.path().join("link.x"), "MEMORY {}\n").unwrap();

        let config = BuildConfig {
            working_dir: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        assert_eq!(check_inputs(&config), vec![PathBuf::from("header.s")]);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let runner = ProcessRunner::new("definitely-not-a-real-assembler-xyz", temp_dir.path());
        match runner.run(ToolKind::Assembler, vec!["main.s".into()]).await {
            Err(BuildError::ToolSpawn { program, .. }) => {
                assert_eq!(program, "definitely-not-a-real-assembler-xyz")
            }
            other => panic!("expected ToolSpawn, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let temp_dir = TempDir::new().unwrap();
        let runner = ProcessRunner::new("sh", temp_dir.path())
            .with_extra_args(vec!["-c".to_string()]);
        let script = "echo assembling; echo 'main.s(2): Error: Bad opcode' >&2; exit 3".to_string();

        let output = runner.run(ToolKind::Assembler, vec![script]).await.unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
        assert_eq!(output.stdout, vec!["assembling".to_string()]);
        assert_eq!(output.stderr, vec!["main.s(2): Error: Bad opcode".to_string()]);
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].line, Some(2));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_line_includes_extra_args() {
        let temp_dir = TempDir::new().unwrap();
        let runner = ProcessRunner::new("sh", temp_dir.path())
            .with_extra_args(vec!["-c".to_string()]);

        let output = runner.run(ToolKind::Linker, vec!["true".to_string()]).await.unwrap();
        assert!(output.success());
        assert_eq!(output.args, vec!["-c".to_string(), "true".to_string()]);
        assert_eq!(output.command_line(), "sh -c true");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_tool() {
        let temp_dir = TempDir::new().unwrap();
        let runner = ProcessRunner::new("sh", temp_dir.path())
            .with_extra_args(vec!["-c".to_string()])
            .with_timeout(Some(Duration::from_millis(200)));

        let result = runner.run(ToolKind::Linker, vec!["sleep 10".to_string()]).await;
        assert!(matches!(result, Err(BuildError::ToolTimeout { .. })));
    }
}
