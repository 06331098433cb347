//! Configuration for ROM builds.
//!
//! # Configuration Flow
//!
//! 1. Start from `BuildConfig::default()` (the classic `main.s` + `header.s`
//!    + `link.x` -> `build/rom.nes` layout) or a JSON file via `loader`
//! 2. Apply command-line overrides (`ConfigOverrides`)
//! 3. `validate_config` checks the result before the orchestrator sees it

pub mod loader;

pub use loader::{ensure_json_path, read_build_config, write_build_config};

use crate::error::ConfigError;
use crate::models::{BuildConfig, FailurePolicy};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Values supplied on the command line; `None` leaves the config untouched.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub working_dir: Option<PathBuf>,
    pub assembler: Option<String>,
    pub linker: Option<String>,
    pub failure_policy: Option<FailurePolicy>,
    pub verify_image: Option<bool>,
    pub tool_timeout_secs: Option<u64>,
}

impl ConfigOverrides {
    pub fn apply(self, config: &mut BuildConfig) {
        if let Some(dir) = self.working_dir {
            config.working_dir = dir;
        }
        if let Some(assembler) = self.assembler {
            config.assembler = assembler;
        }
        if let Some(linker) = self.linker {
            config.linker = linker;
        }
        if let Some(policy) = self.failure_policy {
            config.failure_policy = policy;
        }
        if let Some(verify) = self.verify_image {
            config.verify_image = verify;
        }
        if let Some(secs) = self.tool_timeout_secs {
            config.tool_timeout_secs = Some(secs);
        }
    }
}

/// Load the config at `path`, or the defaults when no path is given.
pub fn load_or_default(path: Option<&Path>) -> Result<BuildConfig, ConfigError> {
    match path {
        Some(path) => read_build_config(path),
        None => Ok(BuildConfig::default()),
    }
}

/// Check that a config describes a buildable layout.
pub fn validate_config(config: &BuildConfig) -> Result<(), ConfigError> {
    if config.sources.is_empty() {
        return Err(ConfigError::ValidationFailed(
            "At least one source file is required".to_string(),
        ));
    }

    if config.assembler.trim().is_empty() || config.linker.trim().is_empty() {
        return Err(ConfigError::ValidationFailed(
            "Assembler and linker programs must be named".to_string(),
        ));
    }

    if config.tool_timeout_secs == Some(0) {
        return Err(ConfigError::ValidationFailed(
            "Tool timeout must be at least one second".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for unit in &config.sources {
        if !seen.insert(&unit.object) {
            return Err(ConfigError::ValidationFailed(format!(
                "Object file {} is produced by more than one source",
                unit.object.display()
            )));
        }
    }
    if seen.contains(&config.output_image) {
        return Err(ConfigError::ValidationFailed(format!(
            "Output image {} collides with an object file",
            config.output_image.display()
        )));
    }

    // Everything the build writes must land inside the fresh output directory.
    let outputs = config
        .sources
        .iter()
        .map(|unit| &unit.object)
        .chain(std::iter::once(&config.output_image));
    for output in outputs {
        if !output.starts_with(&config.output_dir) || output == &config.output_dir {
            return Err(ConfigError::ValidationFailed(format!(
                "{} is outside the output directory {}",
                output.display(),
                config.output_dir.display()
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceUnit;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&BuildConfig::default()).is_ok());
    }

    #[test]
    fn test_overrides_apply_only_given_fields() {
        let mut config = BuildConfig::default();
        ConfigOverrides {
            linker: Some("ld65.exe".to_string()),
            failure_policy: Some(FailurePolicy::Continue),
            ..Default::default()
        }
        .apply(&mut config);

        assert_eq!(config.linker, "ld65.exe");
        assert_eq!(config.assembler, "ca65");
        assert_eq!(config.failure_policy, FailurePolicy::Continue);
        assert!(config.verify_image);
    }

    #[test]
    fn test_load_or_default_without_path() {
        assert_eq!(load_or_default(None).unwrap(), BuildConfig::default());
    }

    #[test]
    fn test_empty_sources_rejected() {
        let config = BuildConfig {
            sources: vec![],
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_duplicate_objects_rejected() {
        let config = BuildConfig {
            sources: vec![
                SourceUnit::new("a.s", "build/out.o"),
                SourceUnit::new("b.s", "build/out.o"),
            ],
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_object_outside_output_dir_rejected() {
        let config = BuildConfig {
            sources: vec![SourceUnit::new("main.s", "main.o")],
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("outside the output directory"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = BuildConfig {
            tool_timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }
}
