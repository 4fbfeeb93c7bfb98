//! Cartridge description supplied by the loader.
//!
//! Parsing LNX headers, detecting headerless images and looking titles up in
//! a database all happen before the cart is built. The result is a
//! [`CartInfo`]: bank page sizes, fitted EEPROM, whether the AUDIN pin is
//! wired to the cartridge, and the screen rotation hint.

use crate::peripherals::EepromKind;
use crate::PAGE_BYTES;

/// Screen rotation requested by the cartridge. Only carried through for the
/// display side; the cart itself ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Left,
    Right,
}

impl Rotation {
    /// LNX header encoding (0 = none, 1 = left, 2 = right).
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Rotation::Left,
            2 => Rotation::Right,
            _ => Rotation::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CartInfo {
    /// Bank 0 size in 256-byte pages (0 = unused)
    pub page_size_bank0: u16,
    /// Bank 1 size in 256-byte pages (0 = unused or shadow RAM)
    pub page_size_bank1: u16,
    /// Serial EEPROM on the cart, if any
    pub eeprom: Option<EepromKind>,
    /// AUDIN pin selects the alternate bank images
    pub aux_input: bool,
    /// Bank 1 is a 64 KB battery-backed RAM when it has no ROM pages
    pub shadow_ram: bool,
    pub rotation: Rotation,
}

/// Standard bank 0 page sizes, smallest first.
const STANDARD_PAGE_SIZES: [u16; 4] = [0x100, 0x200, 0x400, 0x800];

impl CartInfo {
    pub fn new(page_size_bank0: u16, page_size_bank1: u16) -> Self {
        CartInfo { page_size_bank0, page_size_bank1, ..CartInfo::default() }
    }

    /// Geometry for a raw image with no header: everything in bank 0, using
    /// the smallest standard bank that holds the image.
    pub fn headerless(rom_len: usize) -> Self {
        let page_size = STANDARD_PAGE_SIZES
            .into_iter()
            .find(|&pages| pages as usize * PAGE_BYTES >= rom_len)
            .unwrap_or(0x800);
        CartInfo::new(page_size, 0)
    }

    /// Bytes of the image occupied by the ROM banks, alternates included.
    pub fn rom_len(&self) -> usize {
        let banks = (self.page_size_bank0 as usize + self.page_size_bank1 as usize) * PAGE_BYTES;
        if self.aux_input { banks * 2 } else { banks }
    }
}
