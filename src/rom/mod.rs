//! ROM image inspection.

pub mod ines;

pub use ines::{parse_header, verify_image, Mirroring, RomInfo};

use crate::error::ValidationError;
use std::io;
use std::path::Path;

/// Read a linked image from disk and verify its iNES header.
pub fn verify_rom_file(path: &Path) -> Result<RomInfo, ValidationError> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ValidationError::ImageMissing(path.display().to_string()),
        _ => ValidationError::ImageUnreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        },
    })?;
    verify_image(&bytes)
}
