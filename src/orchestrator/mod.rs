//! Build Orchestration: linear ROM build pipeline
//! (Preparation -> Assembly -> Linking -> Validation).

pub mod executor;
pub mod state;

use std::sync::Arc;
use tokio::sync::RwLock;

pub use executor::{check_inputs, create_output_dir, ProcessRunner};
pub use state::{BuildPhaseState, OrchestrationState};

use crate::error::BuildError;
use crate::models::{BuildConfig, BuildReport, BuildStep, FailurePolicy, StepOutcome, ToolOutput};
use crate::rom;
use crate::toolchain::{Assembler, Ca65, Ld65, Linker};
use crate::LogCollector;

/// Drives one build: create the output directory, assemble every source
/// unit, link, then verify the image.
///
/// Steps run strictly in order. Whether a failing tool stops the build is
/// decided by [`FailurePolicy`]; failing to create the output directory
/// always stops it.
pub struct BuildOrchestrator<A: Assembler, L: Linker> {
    config: BuildConfig,
    assembler: A,
    linker: L,
    state: RwLock<OrchestrationState>,
}

impl BuildOrchestrator<Ca65, Ld65> {
    /// Orchestrator backed by the configured ca65/ld65 executables.
    pub fn with_cc65(config: BuildConfig, log_collector: Option<Arc<LogCollector>>) -> Self {
        let assembler = Ca65::from_config(&config, log_collector.clone());
        let linker = Ld65::from_config(&config, log_collector);
        BuildOrchestrator::new(config, assembler, linker)
    }
}

impl<A: Assembler, L: Linker> BuildOrchestrator<A, L> {
    pub fn new(config: BuildConfig, assembler: A, linker: L) -> Self {
        BuildOrchestrator {
            config,
            assembler,
            linker,
            state: RwLock::new(OrchestrationState::new()),
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub async fn current_phase(&self) -> BuildPhaseState {
        self.state.read().await.phase
    }

    pub async fn state_snapshot(&self) -> OrchestrationState {
        self.state.read().await.clone()
    }

    /// Run the whole build.
    ///
    /// Under [`FailurePolicy::Halt`] the first failing step is returned as
    /// `Err`. Under [`FailurePolicy::Continue`] tool failures are recorded in
    /// the report and the remaining steps still run; check
    /// [`BuildReport::success`].
    pub async fn run(&self) -> Result<BuildReport, BuildError> {
        let mut report = BuildReport::default();
        let config = &self.config;

        log::info!(
            target: "parsed",
            "Build started: {} source(s) -> {}",
            config.sources.len(),
            config.output_image.display()
        );

        // Phase 1: Preparation
        let missing = check_inputs(config);
        if !missing.is_empty() {
            log::warn!("[Build] [PREPARATION] {} input(s) missing; tools will report the details", missing.len());
        }

        let output_dir = config.resolve(&config.output_dir);
        if let Err(e) = create_output_dir(&output_dir) {
            log::error!(target: "parsed", "Cannot prepare output directory: {}", e);
            self.state.write().await.fail(e.to_string());
            return Err(e);
        }
        report.record(BuildStep::CreateOutputDir, StepOutcome::Succeeded);

        // Phase 2: Assembly
        self.transition(BuildPhaseState::Assembly).await?;
        for unit in &config.sources {
            let result = self.assembler.assemble(&unit.source, &unit.object).await;
            self.settle(&mut report, BuildStep::Assemble(unit.source.clone()), result)
                .await?;
        }

        // Phase 3: Linking
        self.transition(BuildPhaseState::Linking).await?;
        let objects = config.objects();
        let result = self
            .linker
            .link(&config.link_config, &objects, &config.output_image)
            .await;
        self.settle(&mut report, BuildStep::Link, result).await?;

        // Phase 4: Validation
        if config.verify_image {
            self.transition(BuildPhaseState::Validation).await?;
            match rom::verify_rom_file(&config.resolve(&config.output_image)) {
                Ok(info) => {
                    log::info!(
                        target: "parsed",
                        "Image verified: PRG {} KiB, CHR {} KiB, mapper {}",
                        info.prg_size() / 1024,
                        info.chr_size() / 1024,
                        info.mapper
                    );
                    report.image = Some(info);
                    report.record(BuildStep::VerifyImage, StepOutcome::Succeeded);
                }
                Err(e) => {
                    self.settle(&mut report, BuildStep::VerifyImage, Err(e.into()))
                        .await?;
                }
            }
        }

        let success = report.failed_steps().next().is_none();
        report.success = success;
        if report.success {
            self.transition(BuildPhaseState::Completed).await?;
            let elapsed = self.state.read().await.elapsed();
            log::info!(
                target: "parsed",
                "Build finished: {} in {:.2?}",
                config.output_image.display(),
                elapsed
            );
        } else {
            let failed = report.failed_steps().count();
            let mut state = self.state.write().await;
            state.fail(format!("{} step(s) failed", failed));
            log::error!(
                target: "parsed",
                "Build finished with {} failed step(s) after {:.2?}",
                failed,
                state.elapsed()
            );
        }

        Ok(report)
    }

    async fn transition(&self, next: BuildPhaseState) -> Result<(), BuildError> {
        self.state.write().await.transition_to(next)
    }

    /// Record the outcome of a step and apply the failure policy.
    async fn settle(
        &self,
        report: &mut BuildReport,
        step: BuildStep,
        result: Result<ToolOutput, BuildError>,
    ) -> Result<(), BuildError> {
        let error = match result {
            Ok(output) if output.success() => {
                report.record(step, StepOutcome::Succeeded);
                return Ok(());
            }
            Ok(output) => BuildError::ToolFailed {
                tool: output.tool,
                program: output.program,
                exit_code: output.exit_code,
                diagnostics: output.diagnostics,
            },
            Err(e) => e,
        };

        log::error!(target: "parsed", "Step '{}' failed: {}", step, error);
        report.record(step, StepOutcome::Failed(error.to_string()));

        match self.config.failure_policy {
            FailurePolicy::Halt => {
                self.state.write().await.fail(error.to_string());
                Err(error)
            }
            FailurePolicy::Continue => Ok(()),
        }
    }
}

/// Build with the configured cc65 tools.
pub async fn build_rom(
    config: BuildConfig,
    log_collector: Option<Arc<LogCollector>>,
) -> Result<BuildReport, BuildError> {
    BuildOrchestrator::with_cc65(config, log_collector).run().await
}
