//! iNES header parsing.
//!
//! Layout of the 16-byte header:
//!
//! ```text
//! 0-3  "NES" 0x1A
//! 4    PRG-ROM size, 16 KiB units
//! 5    CHR-ROM size, 8 KiB units (0 = CHR-RAM)
//! 6    mirroring, battery, trainer, four-screen, mapper bits 0-3
//! 7    NES 2.0 marker (bits 2-3), mapper bits 4-7
//! 8    NES 2.0 only: mapper bits 8-11
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const HEADER_SIZE: usize = 16;
pub const TRAINER_SIZE: usize = 512;
pub const PRG_BANK_SIZE: usize = 0x4000;
pub const CHR_BANK_SIZE: usize = 0x2000;
pub const MAGIC: [u8; 4] = *b"NES\x1A";

const FLAG6_VERTICAL: u8 = 0x01;
const FLAG6_BATTERY: u8 = 0x02;
const FLAG6_TRAINER: u8 = 0x04;
const FLAG6_FOUR_SCREEN: u8 = 0x08;
const FLAG7_NES2_MASK: u8 = 0x0C;
const FLAG7_NES2: u8 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    FourScreen,
}

/// Decoded iNES header plus the size of the file it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RomInfo {
    pub prg_banks: u8,
    pub chr_banks: u8,
    /// 12-bit mapper index (upper nibble only populated for NES 2.0).
    pub mapper: u16,
    pub mirroring: Mirroring,
    pub has_battery: bool,
    pub has_trainer: bool,
    pub is_nes2: bool,
    pub file_size: usize,
}

impl RomInfo {
    pub fn prg_size(&self) -> usize {
        self.prg_banks as usize * PRG_BANK_SIZE
    }

    pub fn chr_size(&self) -> usize {
        self.chr_banks as usize * CHR_BANK_SIZE
    }

    /// Total file size implied by the header.
    pub fn expected_size(&self) -> usize {
        let trainer = if self.has_trainer { TRAINER_SIZE } else { 0 };
        HEADER_SIZE + trainer + self.prg_size() + self.chr_size()
    }
}

/// Decode the header at the start of `bytes`.
///
/// Only the header itself is checked here; see [`verify_image`] for the
/// size and layout checks.
pub fn parse_header(bytes: &[u8]) -> Result<RomInfo, ValidationError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ValidationError::TooShort(bytes.len()));
    }

    let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if magic != MAGIC {
        return Err(ValidationError::BadMagic(magic));
    }

    let flags6 = bytes[6];
    let flags7 = bytes[7];
    let is_nes2 = flags7 & FLAG7_NES2_MASK == FLAG7_NES2;

    let mut mapper = ((flags6 >> 4) | (flags7 & 0xF0)) as u16;
    if is_nes2 {
        mapper |= ((bytes[8] & 0x0F) as u16) << 8;
    }

    let mirroring = if flags6 & FLAG6_FOUR_SCREEN != 0 {
        Mirroring::FourScreen
    } else if flags6 & FLAG6_VERTICAL != 0 {
        Mirroring::Vertical
    } else {
        Mirroring::Horizontal
    };

    Ok(RomInfo {
        prg_banks: bytes[4],
        chr_banks: bytes[5],
        mapper,
        mirroring,
        has_battery: flags6 & FLAG6_BATTERY != 0,
        has_trainer: flags6 & FLAG6_TRAINER != 0,
        is_nes2,
        file_size: bytes.len(),
    })
}

/// Decode the header and check that the image is internally consistent.
pub fn verify_image(bytes: &[u8]) -> Result<RomInfo, ValidationError> {
    let info = parse_header(bytes)?;

    if info.prg_banks == 0 {
        return Err(ValidationError::NoPrgRom);
    }

    let expected = info.expected_size();
    if expected != info.file_size {
        return Err(ValidationError::SizeMismatch {
            expected,
            actual: info.file_size,
        });
    }

    // NROM has no bank switching: 16 KiB mirrored or 32 KiB flat.
    if info.mapper == 0 && !matches!(info.prg_banks, 1 | 2) {
        return Err(ValidationError::UnsupportedLayout(format!(
            "NROM requires 1 or 2 PRG banks, header declares {}",
            info.prg_banks
        )));
    }

    Ok(info)
}

#[cfg(test)]
pub(crate) fn build_image(prg_banks: u8, chr_banks: u8, flags6: u8, flags7: u8) -> Vec<u8> {
    let mut bytes = vec![0u8; HEADER_SIZE];
    bytes[..4].copy_from_slice(&MAGIC);
    bytes[4] = prg_banks;
    bytes[5] = chr_banks;
    bytes[6] = flags6;
    bytes[7] = flags7;
    if flags6 & FLAG6_TRAINER != 0 {
        bytes.resize(bytes.len() + TRAINER_SIZE, 0);
    }
    bytes.resize(
        bytes.len() + prg_banks as usize * PRG_BANK_SIZE + chr_banks as usize * CHR_BANK_SIZE,
        0xEA,
    );
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_nrom128_image_verifies() {
        let image = build_image(1, 1, 0x01, 0x00);
        let info = verify_image(&image).expect("valid NROM-128 image");
        assert_eq!(info.prg_banks, 1);
        assert_eq!(info.chr_banks, 1);
        assert_eq!(info.mapper, 0);
        assert_eq!(info.mirroring, Mirroring::Vertical);
        assert_eq!(info.file_size, 16 + 0x4000 + 0x2000);
        assert!(!info.is_nes2);
    }

    #[test]
    fn test_short_image_rejected() {
        assert_eq!(parse_header(b"NES\x1A"), Err(ValidationError::TooShort(4)));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut image = build_image(1, 0, 0, 0);
        image[3] = 0x00;
        assert_eq!(
            parse_header(&image),
            Err(ValidationError::BadMagic(*b"NES\x00"))
        );
    }

    #[test]
    fn test_truncated_prg_is_size_mismatch() {
        let mut image = build_image(2, 1, 0, 0);
        image.truncate(image.len() - 100);
        match verify_image(&image) {
            Err(ValidationError::SizeMismatch { expected, actual }) => {
                assert_eq!(expected, 16 + 2 * 0x4000 + 0x2000);
                assert_eq!(actual, expected - 100);
            }
            other => panic!("expected size mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_trainer_counts_toward_size() {
        let image = build_image(1, 0, FLAG6_TRAINER, 0);
        let info = verify_image(&image).unwrap();
        assert!(info.has_trainer);
        assert_eq!(info.expected_size(), 16 + 512 + 0x4000);
    }

    #[test]
    fn test_no_prg_rejected() {
        let image = build_image(0, 1, 0, 0);
        assert_eq!(verify_image(&image), Err(ValidationError::NoPrgRom));
    }

    #[test]
    fn test_nrom_with_four_prg_banks_rejected() {
        let image = build_image(4, 0, 0, 0);
        assert!(matches!(
            verify_image(&image),
            Err(ValidationError::UnsupportedLayout(_))
        ));
    }

    #[test]
    fn test_mapper_nibbles_combine() {
        // MMC1 (mapper 1) with battery, four PRG banks.
        let image = build_image(4, 2, 0x12, 0x00);
        let info = verify_image(&image).unwrap();
        assert_eq!(info.mapper, 1);
        assert!(info.has_battery);

        // Mapper 0x42 via both nibbles.
        let info = parse_header(&build_image(2, 1, 0x20, 0x40)).unwrap();
        assert_eq!(info.mapper, 0x42);
    }

    #[test]
    fn test_nes2_extends_mapper_to_twelve_bits() {
        let mut image = build_image(2, 1, 0x10, 0x28);
        image[8] = 0x03;
        let info = parse_header(&image).unwrap();
        assert!(info.is_nes2);
        assert_eq!(info.mapper, 0x321);
    }

    #[test]
    fn test_four_screen_overrides_vertical() {
        let info = parse_header(&build_image(1, 0, 0x09, 0)).unwrap();
        assert_eq!(info.mirroring, Mirroring::FourScreen);
    }

    proptest! {
        #[test]
        fn prop_parser_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = verify_image(&bytes);
        }
    }
}
