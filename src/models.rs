//! Core data types for NES ROM Builder.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::rom::RomInfo;

/// What to do when a tool step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the first failing step and return its error.
    Halt,
    /// Record the failure and keep running the remaining steps.
    Continue,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Halt
    }
}

/// External tool category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolKind {
    Assembler,
    Linker,
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolKind::Assembler => write!(f, "assembler"),
            ToolKind::Linker => write!(f, "linker"),
        }
    }
}

/// One assembly source and the object file it produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    pub source: PathBuf,
    pub object: PathBuf,
}

impl SourceUnit {
    pub fn new(source: impl Into<PathBuf>, object: impl Into<PathBuf>) -> Self {
        SourceUnit {
            source: source.into(),
            object: object.into(),
        }
    }
}

/// Build configuration.
///
/// Relative paths are resolved against `working_dir`; tools are spawned with
/// `working_dir` as their current directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub working_dir: PathBuf,
    pub output_dir: PathBuf,
    pub sources: Vec<SourceUnit>,
    pub link_config: PathBuf,
    pub output_image: PathBuf,
    pub assembler: String,
    pub linker: String,
    pub assembler_args: Vec<String>,
    pub linker_args: Vec<String>,
    pub failure_policy: FailurePolicy,
    pub verify_image: bool,
    pub tool_timeout_secs: Option<u64>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            working_dir: PathBuf::from("."),
            output_dir: PathBuf::from("build"),
            sources: vec![
                SourceUnit::new("main.s", "build/main.o"),
                SourceUnit::new("header.s", "build/header.o"),
            ],
            link_config: PathBuf::from("link.x"),
            output_image: PathBuf::from("build/rom.nes"),
            assembler: "ca65".to_string(),
            linker: "ld65".to_string(),
            assembler_args: Vec::new(),
            linker_args: Vec::new(),
            failure_policy: FailurePolicy::Halt,
            verify_image: true,
            tool_timeout_secs: None,
        }
    }
}

impl BuildConfig {
    /// Resolve a configured path against the working directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Object files in link order.
    pub fn objects(&self) -> Vec<PathBuf> {
        self.sources.iter().map(|unit| unit.object.clone()).collect()
    }
}

/// Diagnostic severity reported by ca65/ld65.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A single diagnostic line parsed from tool output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub message: String,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{}:{}: ", file, line)?,
            (Some(file), None) => write!(f, "{}: ", file)?,
            _ => {}
        }
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// Captured result of one external tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool: ToolKind,
    pub program: String,
    pub args: Vec<String>,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Shell-like rendering of the invocation, for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A step of the build sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStep {
    CreateOutputDir,
    Assemble(PathBuf),
    Link,
    VerifyImage,
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStep::CreateOutputDir => write!(f, "create output directory"),
            BuildStep::Assemble(source) => write!(f, "assemble {}", source.display()),
            BuildStep::Link => write!(f, "link"),
            BuildStep::VerifyImage => write!(f, "verify image"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: BuildStep,
    pub outcome: StepOutcome,
}

impl StepRecord {
    pub fn succeeded(&self) -> bool {
        self.outcome == StepOutcome::Succeeded
    }
}

/// Summary of a finished build run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildReport {
    pub steps: Vec<StepRecord>,
    pub image: Option<RomInfo>,
    pub success: bool,
}

impl BuildReport {
    pub fn record(&mut self, step: BuildStep, outcome: StepOutcome) {
        self.steps.push(StepRecord { step, outcome });
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|record| !record.succeeded())
    }

    /// Whether a step of the given kind was attempted.
    pub fn attempted(&self, step: &BuildStep) -> bool {
        self.steps.iter().any(|record| &record.step == step)
    }
}
