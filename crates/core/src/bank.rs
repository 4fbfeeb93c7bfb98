//! Cartridge bank geometry and backing storage.
//!
//! A bank is `page_size` pages of 256 bytes. The cart address is formed from
//! the 8-bit shift register (page number) and the low bits of the 11-bit
//! page offset counter:
//!
//! ```text
//! addr = ((shift << shift_bits) | (counter & offset_mask)) & mask
//! ```
//!
//! | page_size | bank size | shift_bits | offset_mask |
//! |-----------|-----------|------------|-------------|
//! | 0x100     | 64 KB     | 8          | 0x0FF       |
//! | 0x200     | 128 KB    | 9          | 0x1FF       |
//! | 0x400     | 256 KB    | 10         | 0x3FF       |
//! | 0x800     | 512 KB    | 11         | 0x7FF       |

use std::sync::Arc;

use crate::{FILL_BYTE, PAGE_BYTES};

/// Logical bank, selected by which Suzy cart register is accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankId {
    Bank0,
    Bank1,
}

impl BankId {
    pub(crate) fn index(self) -> usize {
        match self {
            BankId::Bank0 => 0,
            BankId::Bank1 => 1,
        }
    }
}

/// Physical image behind an access: a bank or its AUDIN-selected alternate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankSlot {
    Bank0,
    Bank1,
    Bank0A,
    Bank1A,
}

impl BankSlot {
    pub fn bank(self) -> BankId {
        match self {
            BankSlot::Bank0 | BankSlot::Bank0A => BankId::Bank0,
            BankSlot::Bank1 | BankSlot::Bank1A => BankId::Bank1,
        }
    }

    pub fn is_alt(self) -> bool {
        matches!(self, BankSlot::Bank0A | BankSlot::Bank1A)
    }

    pub(crate) fn index(self) -> usize {
        self.bank().index()
    }
}

/// Read-only window into the cartridge image, starting at `start`.
#[derive(Debug, Clone)]
pub struct RomView {
    image: Arc<[u8]>,
    start: usize,
}

impl RomView {
    pub fn new(image: Arc<[u8]>, start: usize) -> Self {
        RomView { image, start }
    }

    #[inline(always)]
    fn get(&self, addr: usize) -> Option<u8> {
        self.image.get(self.start.checked_add(addr)?).copied()
    }

    /// Bytes available in the window, capped at `len`.
    fn to_vec(&self, len: usize) -> Vec<u8> {
        let start = self.start.min(self.image.len());
        let end = start.saturating_add(len).min(self.image.len());
        self.image[start..end].to_vec()
    }
}

/// Storage behind a bank image.
#[derive(Debug, Clone, Default)]
pub enum BankData {
    #[default]
    Empty,
    Rom(RomView),
    /// Writable region owned by the cart (bank 1 only)
    Ram(Vec<u8>),
}

impl BankData {
    #[inline(always)]
    fn get(&self, addr: usize) -> u8 {
        match self {
            BankData::Empty => FILL_BYTE,
            BankData::Rom(view) => view.get(addr).unwrap_or(FILL_BYTE),
            BankData::Ram(ram) => ram.get(addr).copied().unwrap_or(FILL_BYTE),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Bank {
    /// Bytes in the bank, 0 if unused
    size: usize,
    mask: usize,
    shift_bits: u32,
    offset_mask: u16,
    data: BankData,
    /// AUDIN alternate image
    alt: BankData,
    write_enabled: bool,
    dirty: bool,
}

impl Bank {
    /// Bank with geometry derived from `page_size`. Page sizes that are not a
    /// power of two are rounded down.
    pub fn new(page_size: u16, data: BankData) -> Self {
        if page_size == 0 {
            return Bank { data, ..Bank::default() };
        }
        let pages = if page_size.is_power_of_two() {
            page_size
        } else {
            let rounded = 1u16 << page_size.ilog2();
            log::warn!("Page size {:#x} is not a power of two, using {:#x}", page_size, rounded);
            rounded
        };
        let shift_bits = pages.trailing_zeros();
        let size = pages as usize * PAGE_BYTES;
        let write_enabled = matches!(data, BankData::Ram(_));
        Bank {
            size,
            mask: size - 1,
            shift_bits,
            offset_mask: ((1u32 << shift_bits) - 1) as u16,
            data,
            alt: BankData::Empty,
            write_enabled,
            dirty: false,
        }
    }

    /// RAM bank initialised from `init` (or erased), padded to the bank size.
    pub fn new_ram(page_size: u16, init: Option<&RomView>) -> Self {
        let mut bank = Bank::new(page_size, BankData::Empty);
        let mut ram = init.map(|view| view.to_vec(bank.size)).unwrap_or_default();
        ram.resize(bank.size, FILL_BYTE);
        bank.data = BankData::Ram(ram);
        bank.write_enabled = bank.size > 0;
        bank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_ram(&self) -> bool {
        matches!(self.data, BankData::Ram(_))
    }

    pub fn set_alt(&mut self, alt: BankData) {
        self.alt = alt;
    }

    /// Byte offset inside the bank; always `< size` for a configured bank.
    #[inline(always)]
    pub fn address(&self, shift_value: u8, page_offset: u16) -> usize {
        (((shift_value as usize) << self.shift_bits)
            | (page_offset & self.offset_mask) as usize)
            & self.mask
    }

    #[inline(always)]
    pub fn byte(&self, alt: bool, addr: usize) -> u8 {
        if self.size == 0 {
            return FILL_BYTE;
        }
        if alt { self.alt.get(addr) } else { self.data.get(addr) }
    }

    /// Store into the primary image if it is enabled RAM. Returns true if
    /// the byte landed.
    pub fn store(&mut self, alt: bool, addr: usize, value: u8) -> bool {
        if alt || !self.write_enabled {
            return false;
        }
        let BankData::Ram(ram) = &mut self.data else {
            return false;
        };
        match ram.get_mut(addr) {
            Some(cell) => {
                *cell = value;
                if !self.dirty {
                    log::debug!("Cart RAM modified");
                }
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn write_enabled(&self) -> bool {
        self.write_enabled
    }

    pub fn set_write_enabled(&mut self, enabled: bool) {
        self.write_enabled = enabled;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn mark_dirty(&mut self) {
        if self.is_ram() {
            self.dirty = true;
        }
    }

    pub fn ram(&self) -> Option<&[u8]> {
        match &self.data {
            BankData::Ram(ram) => Some(ram),
            _ => None,
        }
    }

    /// Overwrite RAM contents from `data`. Bytes past `data` keep their value.
    pub fn load_ram(&mut self, data: &[u8]) {
        if let BankData::Ram(ram) = &mut self.data {
            let len = data.len().min(ram.len());
            ram[..len].copy_from_slice(&data[..len]);
            self.dirty = false;
        }
    }
}
