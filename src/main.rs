use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::LevelFilter;

use nes_rom_builder::config::{self, ConfigOverrides};
use nes_rom_builder::{build_rom, BuildConfig, BuildError, BuildReport, FailurePolicy, LogCollector};

const EXIT_SUCCESS: u8 = 0;
const EXIT_BUILD_FAILED: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON build configuration (defaults: main.s + header.s + link.x -> build/rom.nes)
    #[clap(long)]
    config: Option<PathBuf>,

    /// Directory the build runs in; relative paths resolve against it
    #[clap(short = 'C', long = "workdir")]
    workdir: Option<PathBuf>,

    /// Assembler executable
    #[clap(long)]
    assembler: Option<String>,

    /// Linker executable
    #[clap(long)]
    linker: Option<String>,

    /// Keep running the remaining steps after a tool fails
    #[clap(long, default_value_t = false)]
    keep_going: bool,

    /// Skip iNES header verification of the linked image
    #[clap(long, default_value_t = false)]
    no_verify: bool,

    /// Kill a tool that runs longer than this many seconds
    #[clap(long)]
    timeout: Option<u64>,

    /// Where to write build logs (defaults to a directory under the system temp dir)
    #[clap(long)]
    log_dir: Option<PathBuf>,

    /// Print more output (-v debug, -vv trace)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only print warnings and errors
    #[clap(short, long, default_value_t = false)]
    quiet: bool,

    /// Write the default configuration to this file and exit
    #[clap(long, value_name = "FILE")]
    write_default_config: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            working_dir: self.workdir.clone(),
            assembler: self.assembler.clone(),
            linker: self.linker.clone(),
            failure_policy: self.keep_going.then_some(FailurePolicy::Continue),
            verify_image: self.no_verify.then_some(false),
            tool_timeout_secs: self.timeout,
        }
    }

    fn echo_level(&self) -> LevelFilter {
        match (self.quiet, self.verbose) {
            (true, _) => LevelFilter::Warn,
            (false, 0) => LevelFilter::Info,
            (false, 1) => LevelFilter::Debug,
            (false, _) => LevelFilter::Trace,
        }
    }
}

fn exit_status(result: &Result<BuildReport, BuildError>) -> u8 {
    match result {
        Ok(report) if report.success => EXIT_SUCCESS,
        _ => EXIT_BUILD_FAILED,
    }
}

fn print_success(report: &BuildReport, config: &BuildConfig) {
    match &report.image {
        Some(info) => println!(
            "{}: PRG {} KiB, CHR {} KiB, mapper {}, {:?} mirroring",
            config.output_image.display(),
            info.prg_size() / 1024,
            info.chr_size() / 1024,
            info.mapper,
            info.mirroring
        ),
        None => println!("{}: linked", config.output_image.display()),
    }
}

/// Report a failed build on stderr.
///
/// With a logger installed the orchestrator has already echoed every failure,
/// so only a pointer to the full log is printed.
fn print_failure(result: &Result<BuildReport, BuildError>, full_log: Option<&Path>) {
    if let Some(path) = full_log {
        eprintln!("build failed; full log at {}", path.display());
        return;
    }

    match result {
        Ok(report) => {
            for record in report.failed_steps() {
                if let nes_rom_builder::StepOutcome::Failed(reason) = &record.outcome {
                    eprintln!("error: {}: {}", record.step, reason);
                }
            }
        }
        Err(e) => eprintln!("error: {}", e),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(path) = &args.write_default_config {
        return match config::write_build_config(&BuildConfig::default(), path) {
            Ok(()) => {
                println!("wrote {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {}", e);
                ExitCode::from(EXIT_CONFIG_ERROR)
            }
        };
    }

    let mut build_config = match config::load_or_default(args.config.as_deref()) {
        Ok(build_config) => build_config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    args.overrides().apply(&mut build_config);
    if let Err(e) = config::validate_config(&build_config) {
        eprintln!("error: {}", e);
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }

    // =========================================================================
    // LOGGING INITIALIZATION
    // =========================================================================
    let log_dir = args
        .log_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("nes_rom_builder").join("logs"));
    let log_collector = match LogCollector::new(log_dir, args.echo_level()) {
        Ok(collector) => Some(Arc::new(collector)),
        Err(e) => {
            eprintln!("warning: file logging disabled: {}", e);
            None
        }
    };

    let mut echoed_log = None;
    if let Some(ref collector) = log_collector {
        let max_level = args.echo_level().max(LevelFilter::Debug);
        match collector.install(max_level) {
            Ok(()) => echoed_log = Some(collector.full_log_path().to_path_buf()),
            Err(e) => eprintln!("warning: failed to register logger: {}", e),
        }
        log::debug!("Logging to {}", collector.full_log_path().display());
    }

    // =========================================================================
    // BUILD
    // =========================================================================
    let result = build_rom(build_config.clone(), log_collector.clone()).await;
    let status = exit_status(&result);
    match &result {
        Ok(report) if report.success => print_success(report, &build_config),
        _ => print_failure(&result, echoed_log.as_deref()),
    }

    if let Some(collector) = log_collector {
        if let Err(e) = collector.wait_for_empty().await {
            eprintln!("warning: failed to flush logs: {}", e);
        }
    }

    ExitCode::from(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nes_rom_builder::models::{BuildStep, StepOutcome};

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("nes_rom_builder").chain(argv.iter().copied()))
            .expect("arguments should parse")
    }

    #[test]
    fn test_no_flags_override_nothing() {
        let mut config = BuildConfig::default();
        parse(&[]).overrides().apply(&mut config);
        assert_eq!(config, BuildConfig::default());
    }

    #[test]
    fn test_flags_map_to_overrides() {
        let args = parse(&[
            "-C", "game", "--assembler", "ca65.exe", "--linker", "ld65.exe",
            "--keep-going", "--no-verify", "--timeout", "30",
        ]);
        let mut config = BuildConfig::default();
        args.overrides().apply(&mut config);

        assert_eq!(config.working_dir, PathBuf::from("game"));
        assert_eq!(config.assembler, "ca65.exe");
        assert_eq!(config.linker, "ld65.exe");
        assert_eq!(config.failure_policy, FailurePolicy::Continue);
        assert!(!config.verify_image);
        assert_eq!(config.tool_timeout_secs, Some(30));
    }

    #[test]
    fn test_echo_level_from_verbosity() {
        assert_eq!(parse(&[]).echo_level(), LevelFilter::Info);
        assert_eq!(parse(&["-v"]).echo_level(), LevelFilter::Debug);
        assert_eq!(parse(&["-vv"]).echo_level(), LevelFilter::Trace);
        assert_eq!(parse(&["-q"]).echo_level(), LevelFilter::Warn);
        assert_eq!(parse(&["-q", "-v"]).echo_level(), LevelFilter::Warn);
    }

    #[test]
    fn test_timeout_must_be_numeric() {
        let argv = ["nes_rom_builder", "--timeout", "soon"];
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_exit_status_mapping() {
        let mut report = BuildReport::default();
        report.record(BuildStep::CreateOutputDir, StepOutcome::Succeeded);
        report.success = true;
        assert_eq!(exit_status(&Ok(report.clone())), EXIT_SUCCESS);

        report.record(BuildStep::Link, StepOutcome::Failed("ld65 exited".to_string()));
        report.success = false;
        assert_eq!(exit_status(&Ok(report)), EXIT_BUILD_FAILED);

        let err = BuildError::OutputDirExists(PathBuf::from("build"));
        assert_eq!(exit_status(&Err(err)), EXIT_BUILD_FAILED);
    }
}
