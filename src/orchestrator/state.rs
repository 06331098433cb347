//! Build State Management and Phase Tracking
//!
//! **Architecture**:
//! - `BuildPhaseState`: discrete phases of a ROM build
//! - `OrchestrationState`: current phase plus timing and failure context
//! - Transitions are driven by the orchestrator and checked here

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::error::BuildError;

/// Build phase enumeration - discrete states in the build lifecycle.
///
/// The orchestrator moves through these sequentially; any working phase may
/// drop to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildPhaseState {
    /// Output directory creation and input pre-flight
    Preparation,

    /// One assembler run per source unit
    Assembly,

    /// Single linker run producing the image
    Linking,

    /// iNES header verification of the linked image
    Validation,

    /// Build completed successfully
    Completed,

    /// Build failed
    Failed,
}

impl BuildPhaseState {
    /// Get the human-readable name for this phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildPhaseState::Preparation => "preparation",
            BuildPhaseState::Assembly => "assembly",
            BuildPhaseState::Linking => "linking",
            BuildPhaseState::Validation => "validation",
            BuildPhaseState::Completed => "completed",
            BuildPhaseState::Failed => "failed",
        }
    }

    /// Get all valid phase transitions FROM this phase.
    pub fn valid_next_phases(&self) -> Vec<BuildPhaseState> {
        match self {
            BuildPhaseState::Preparation => vec![BuildPhaseState::Assembly, BuildPhaseState::Failed],
            BuildPhaseState::Assembly => vec![BuildPhaseState::Linking, BuildPhaseState::Failed],
            // Validation is optional.
            BuildPhaseState::Linking => vec![
                BuildPhaseState::Validation,
                BuildPhaseState::Completed,
                BuildPhaseState::Failed,
            ],
            BuildPhaseState::Validation => vec![BuildPhaseState::Completed, BuildPhaseState::Failed],
            BuildPhaseState::Completed => vec![],
            BuildPhaseState::Failed => vec![],
        }
    }

    /// Check if a transition to the given phase is valid.
    pub fn can_transition_to(&self, next: BuildPhaseState) -> bool {
        self.valid_next_phases().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildPhaseState::Completed | BuildPhaseState::Failed)
    }
}

impl std::fmt::Display for BuildPhaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build execution state snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationState {
    /// Current build phase
    pub phase: BuildPhaseState,

    /// Build start timestamp
    pub start_time: SystemTime,

    /// Last phase update timestamp
    pub last_update_time: SystemTime,

    /// Error message if phase failed
    pub error: Option<String>,
}

impl OrchestrationState {
    pub fn new() -> Self {
        let now = SystemTime::now();
        OrchestrationState {
            phase: BuildPhaseState::Preparation,
            start_time: now,
            last_update_time: now,
            error: None,
        }
    }

    /// Move to `next`, rejecting transitions the phase graph does not allow.
    pub fn transition_to(&mut self, next: BuildPhaseState) -> Result<(), BuildError> {
        if !self.phase.can_transition_to(next) {
            return Err(BuildError::InvalidTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        log::debug!("[Build] [STATE] {} -> {}", self.phase, next);
        self.phase = next;
        self.last_update_time = SystemTime::now();
        Ok(())
    }

    /// Record a failure and enter `Failed` (no-op if already terminal).
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.error = Some(reason.into());
        if !self.phase.is_terminal() {
            self.phase = BuildPhaseState::Failed;
            self.last_update_time = SystemTime::now();
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.last_update_time
            .duration_since(self.start_time)
            .unwrap_or_default()
    }
}

impl Default for OrchestrationState {
    fn default() -> Self {
        OrchestrationState::new()
    }
}
