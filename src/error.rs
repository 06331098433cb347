//! Unified error type hierarchy for NES ROM Builder
//!
//! Provides structured error handling with BuildError, ConfigError and
//! ValidationError.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::{Diagnostic, ToolKind};

/// Configuration file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid JSON in config: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Build process execution errors.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Output directory already exists: {}", .0.display())]
    OutputDirExists(PathBuf),

    #[error("Failed to create output directory {}: {source}", path.display())]
    OutputDirCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to start {program}: {source}")]
    ToolSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} '{program}' failed ({}){}", exit_label(.exit_code), first_diagnostic(.diagnostics))]
    ToolFailed {
        tool: ToolKind,
        program: String,
        exit_code: Option<i32>,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("{program} did not finish within {secs}s and was killed")]
    ToolTimeout { program: String, secs: u64 },

    #[error("I/O error while running {program}: {source}")]
    ToolIo {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("ROM verification failed: {0}")]
    Validation(#[from] ValidationError),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

fn first_diagnostic(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .find(|d| d.is_error())
        .or_else(|| diagnostics.first())
        .map(|d| format!(": {}", d))
        .unwrap_or_default()
}

/// iNES image verification errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("ROM image missing: {0}")]
    ImageMissing(String),

    #[error("Cannot read ROM image {path}: {reason}")]
    ImageUnreadable { path: String, reason: String },

    #[error("Image is {0} bytes, shorter than the 16-byte iNES header")]
    TooShort(usize),

    #[error("Bad iNES magic: {0:02X?}")]
    BadMagic([u8; 4]),

    #[error("Header declares no PRG-ROM banks")]
    NoPrgRom,

    #[error("Image size mismatch: header implies {expected} bytes, file has {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Unsupported layout: {0}")]
    UnsupportedLayout(String),
}

impl BuildError {
    /// Whether this error was raised before any tool was invoked.
    pub fn is_preparation_failure(&self) -> bool {
        matches!(
            self,
            BuildError::OutputDirExists(_) | BuildError::OutputDirCreate { .. }
        )
    }
}
