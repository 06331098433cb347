//! Reading and writing build configurations as JSON.

use crate::error::ConfigError;
use crate::models::BuildConfig;
use std::fs;
use std::io;
use std::path::Path;

/// Read a build config. Fields the file leaves out take their defaults.
pub fn read_build_config(path: &Path) -> Result<BuildConfig, ConfigError> {
    ensure_json_path(path)?;

    let content = fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ConfigError::FileNotFound(path.display().to_string()),
        _ => ConfigError::IoError(e),
    })?;

    Ok(serde_json::from_str(&content)?)
}

/// Write `config` as pretty JSON, creating parent directories as needed.
pub fn write_build_config(config: &BuildConfig, path: &Path) -> Result<(), ConfigError> {
    ensure_json_path(path)?;

    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)?,
        _ => {}
    }
    fs::write(path, serde_json::to_string_pretty(config)?)?;
    Ok(())
}

/// Build configs are JSON only; anything else is rejected before touching disk.
pub fn ensure_json_path(path: &Path) -> Result<(), ConfigError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(()),
        Some(other) => Err(ConfigError::ValidationFailed(format!(
            "build config {} must be a .json file, not .{}",
            path.display(),
            other
        ))),
        None => Err(ConfigError::ValidationFailed(format!(
            "build config '{}' must be a .json file",
            path.display()
        ))),
    }
}
