//! External toolchain capabilities.
//!
//! The orchestrator only talks to [`Assembler`] and [`Linker`]; the cc65
//! implementations ([`Ca65`], [`Ld65`]) shell out through
//! [`ProcessRunner`](crate::orchestrator::executor::ProcessRunner). Tests
//! substitute in-process stubs.

pub mod diagnostics;

use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::BuildError;
use crate::models::{BuildConfig, ToolKind, ToolOutput};
use crate::orchestrator::executor::ProcessRunner;
use crate::LogCollector;

pub use diagnostics::{collect_diagnostics, parse_diagnostic};

/// Translates one source file into one object file.
pub trait Assembler: Send + Sync {
    fn assemble<'a>(
        &'a self,
        source: &'a Path,
        object: &'a Path,
    ) -> BoxFuture<'a, Result<ToolOutput, BuildError>>;
}

/// Combines object files into a ROM image according to a link configuration.
pub trait Linker: Send + Sync {
    fn link<'a>(
        &'a self,
        config: &'a Path,
        objects: &'a [PathBuf],
        image: &'a Path,
    ) -> BoxFuture<'a, Result<ToolOutput, BuildError>>;
}

fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn runner_for(
    program: &str,
    extra_args: &[String],
    config: &BuildConfig,
    log_collector: Option<Arc<LogCollector>>,
) -> ProcessRunner {
    ProcessRunner::new(program, config.working_dir.clone())
        .with_extra_args(extra_args.to_vec())
        .with_timeout(config.tool_timeout_secs.map(Duration::from_secs))
        .with_log_collector(log_collector)
}

/// The cc65 suite assembler: `ca65 <source> -o <object>`.
#[derive(Clone)]
pub struct Ca65 {
    runner: ProcessRunner,
}

impl Ca65 {
    pub fn new(runner: ProcessRunner) -> Self {
        Ca65 { runner }
    }

    pub fn from_config(config: &BuildConfig, log_collector: Option<Arc<LogCollector>>) -> Self {
        Ca65::new(runner_for(
            &config.assembler,
            &config.assembler_args,
            config,
            log_collector,
        ))
    }

    pub fn arguments(source: &Path, object: &Path) -> Vec<String> {
        vec![arg(source), "-o".to_string(), arg(object)]
    }
}

impl Assembler for Ca65 {
    fn assemble<'a>(
        &'a self,
        source: &'a Path,
        object: &'a Path,
    ) -> BoxFuture<'a, Result<ToolOutput, BuildError>> {
        Box::pin(async move {
            self.runner
                .run(ToolKind::Assembler, Ca65::arguments(source, object))
                .await
        })
    }
}

/// The cc65 suite linker: `ld65 -C <config> <objects...> -o <image>`.
#[derive(Clone)]
pub struct Ld65 {
    runner: ProcessRunner,
}

impl Ld65 {
    pub fn new(runner: ProcessRunner) -> Self {
        Ld65 { runner }
    }

    pub fn from_config(config: &BuildConfig, log_collector: Option<Arc<LogCollector>>) -> Self {
        Ld65::new(runner_for(&config.linker, &config.linker_args, config, log_collector))
    }

    pub fn arguments(config: &Path, objects: &[PathBuf], image: &Path) -> Vec<String> {
        let mut args = vec!["-C".to_string(), arg(config)];
        args.extend(objects.iter().map(|object| arg(object)));
        args.push("-o".to_string());
        args.push(arg(image));
        args
    }
}

impl Linker for Ld65 {
    fn link<'a>(
        &'a self,
        config: &'a Path,
        objects: &'a [PathBuf],
        image: &'a Path,
    ) -> BoxFuture<'a, Result<ToolOutput, BuildError>> {
        Box::pin(async move {
            self.runner
                .run(ToolKind::Linker, Ld65::arguments(config, objects, image))
                .await
        })
    }
}
