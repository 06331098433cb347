//! NES ROM Builder
//!
//! Drives the cc65 toolchain (ca65 assembler, ld65 linker) to turn assembly
//! sources into an iNES ROM image, then checks the image header.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Build configuration, tool output and report types
//! - **config**: JSON configuration loading, overrides and validation
//! - **toolchain**: Assembler/Linker capabilities and the cc65 implementations
//! - **orchestrator**: Sequential build pipeline and phase tracking
//! - **rom**: iNES header parsing and image verification
//! - **log_collector**: Disk-backed `log` implementation

// Core foundational modules
pub mod error;
pub mod models;

pub mod config;
pub mod toolchain;
pub mod rom;

// Robust, decoupled logging system
pub mod log_collector;

// Build orchestration and phase tracking
pub mod orchestrator;

// Re-export the log crate for macro usage
pub use log;

// Re-export log collector for use throughout the system
pub use log_collector::{LogCollector, LogLine};

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{BuildError, ConfigError, ValidationError};

pub use models::{
    BuildConfig, BuildReport, BuildStep, Diagnostic, FailurePolicy, Severity, SourceUnit,
    StepOutcome, StepRecord, ToolKind, ToolOutput,
};

pub use config::ConfigOverrides;

pub use toolchain::{Assembler, Ca65, Ld65, Linker};

pub use orchestrator::{build_rom, BuildOrchestrator, BuildPhaseState, OrchestrationState};

pub use rom::{Mirroring, RomInfo};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        assert_eq!(VERSION, "0.1.0");
    }

    #[test]
    fn test_reexports_accessible() {
        let _policy = FailurePolicy::Halt;
        let _kind = ToolKind::Linker;
        assert_eq!(BuildPhaseState::Preparation, BuildPhaseState::Preparation);
    }
}
