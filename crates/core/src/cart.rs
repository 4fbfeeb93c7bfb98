//! Cartridge bank addressing engine.
//!
//! The Lynx reaches cartridge memory through Suzy's RCART0/RCART1 registers
//! and a handful of lines driven from Mikey:
//!
//! - **Strobe** (CART_ADDR_STROBE): a rising edge clocks the address data
//!   line into the 8-bit shift register; while high, the page offset counter
//!   is held at zero.
//! - **Address data**: the bit captured on the next strobe rising edge.
//! - **Page offset counter**: 11 bits, incremented after every RCART access
//!   while strobe is low.
//!
//! The counter doubles as the EEPROM's CS (bit 7) and CLK (bit 1) lines, so
//! every counter change is forwarded to the fitted [`Eeprom`], if any.

use std::sync::Arc;

use crate::bank::{Bank, BankData, BankId, BankSlot, RomView};
use crate::cart_info::{CartInfo, Rotation};
use crate::peripherals::Eeprom;
use crate::savestate::{CartState, SaveState};
use crate::{PAGE_BYTES, PAGE_OFFSET_MASK, SHADOW_RAM_PAGES};

pub struct Cart {
    banks: [Bank; 2],
    /// Address shift register (page number)
    shift_value: u8,
    /// 11-bit page offset counter
    page_offset: u16,
    strobe_level: bool,
    bit_level: bool,
    /// AUDIN wired to the cart (alternate bank images present)
    aux_input: bool,
    rotation: Rotation,
    eeprom: Option<Eeprom>,
}

impl Cart {
    /// Cart with no banks and no EEPROM. Every read returns [`crate::FILL_BYTE`].
    pub fn empty() -> Self {
        Cart {
            banks: [Bank::default(), Bank::default()],
            shift_value: 0,
            page_offset: 0,
            strobe_level: false,
            bit_level: false,
            aux_input: false,
            rotation: Rotation::None,
            eeprom: None,
        }
    }

    /// Build a cart from a ROM image laid out as bank 0, bank 1, then (with
    /// AUDIN) bank 0A and bank 1A.
    pub fn new(rom: Arc<[u8]>, info: &CartInfo) -> Self {
        let mut cart = Cart::empty();
        let bank0_len = info.page_size_bank0 as usize * PAGE_BYTES;
        let bank1_len = info.page_size_bank1 as usize * PAGE_BYTES;

        cart.configure(BankId::Bank0, info.page_size_bank0, Some(RomView::new(rom.clone(), 0)), false);
        if info.page_size_bank1 > 0 {
            cart.configure(BankId::Bank1, info.page_size_bank1,
                Some(RomView::new(rom.clone(), bank0_len)), false);
        } else if info.shadow_ram {
            cart.configure_shadow_ram();
        }

        if info.aux_input {
            let alt_start = bank0_len + bank1_len;
            cart.configure_alt(BankId::Bank0, Some(RomView::new(rom.clone(), alt_start)));
            if info.page_size_bank1 > 0 {
                cart.configure_alt(BankId::Bank1,
                    Some(RomView::new(rom.clone(), alt_start + bank0_len)));
            }
        }
        if rom.len() < info.rom_len() {
            log::warn!("ROM image is {} bytes, banks need {}", rom.len(), info.rom_len());
        }

        cart.aux_input = info.aux_input;
        cart.rotation = info.rotation;
        cart.eeprom = info.eeprom.map(Eeprom::new);

        log::info!(
            "Cart: bank0={}KB bank1={}KB{} audin={} eeprom={}",
            cart.banks[0].size() / 1024,
            cart.banks[1].size() / 1024,
            if cart.banks[1].is_ram() { " (RAM)" } else { "" },
            cart.aux_input,
            info.eeprom.map(|k| k.name()).unwrap_or_else(|| "none".into()),
        );
        cart
    }

    /// Set the geometry and contents of a bank. A `page_size` of 0 leaves
    /// the bank unused. `is_ram` copies `data` into a writable region owned
    /// by the cart (bank 1 only).
    pub fn configure(&mut self, bank: BankId, page_size: u16, data: Option<RomView>, is_ram: bool) {
        let new_bank = if is_ram && bank == BankId::Bank1 {
            Bank::new_ram(page_size, data.as_ref())
        } else {
            if is_ram {
                log::warn!("Bank 0 cannot be RAM, mapping it as ROM");
            }
            Bank::new(page_size, data.map(BankData::Rom).unwrap_or_default())
        };
        self.banks[bank.index()] = new_bank;
    }

    /// Bank 1 becomes 64 KB of battery-backed RAM.
    pub fn configure_shadow_ram(&mut self) {
        self.banks[1] = Bank::new_ram(SHADOW_RAM_PAGES, None);
    }

    /// Set the image seen when AUDIN selects the alternate bank. Geometry is
    /// shared with the primary image.
    pub fn configure_alt(&mut self, bank: BankId, data: Option<RomView>) {
        self.banks[bank.index()].set_alt(data.map(BankData::Rom).unwrap_or_default());
    }

    /// Power-down / soft reset. Bank contents survive; EEPROM cells are erased.
    pub fn reset(&mut self) {
        self.shift_value = 0;
        self.page_offset = 0;
        self.strobe_level = false;
        self.bit_level = false;
        if let Some(eeprom) = &mut self.eeprom {
            eeprom.reset();
        }
    }

    // --- Address lines ---

    /// Byte offset of the next access to `slot`.
    #[inline(always)]
    pub fn address_for(&self, slot: BankSlot) -> usize {
        self.banks[slot.index()].address(self.shift_value, self.page_offset)
    }

    /// Drive the strobe line.
    pub fn strobe(&mut self, level: bool) {
        if level {
            self.page_offset = 0;
            if !self.strobe_level {
                self.shift_value = (self.shift_value << 1) | self.bit_level as u8;
            }
            self.notify_eeprom();
        }
        self.strobe_level = level;
    }

    /// Drive the address data line, sampled on the next strobe rising edge.
    pub fn set_bit(&mut self, level: bool) {
        self.bit_level = level;
    }

    fn advance(&mut self) {
        if !self.strobe_level {
            self.page_offset = (self.page_offset + 1) & PAGE_OFFSET_MASK;
            self.notify_eeprom();
        }
    }

    fn notify_eeprom(&mut self) {
        if let Some(eeprom) = &mut self.eeprom {
            eeprom.notify_counter(self.page_offset);
        }
    }

    // --- Data access ---

    /// RCART read: returns the addressed byte and clocks the counter.
    pub fn read(&mut self, slot: BankSlot) -> u8 {
        let data = self.peek(slot);
        self.advance();
        data
    }

    /// Side-effect-free read for debuggers.
    pub fn peek(&self, slot: BankSlot) -> u8 {
        let bank = &self.banks[slot.index()];
        bank.byte(slot.is_alt(), self.address_for(slot))
    }

    /// RCART write. Only enabled bank 1 RAM is modified, but the counter is
    /// clocked either way (this is how games bit-bang the EEPROM).
    pub fn write(&mut self, slot: BankSlot, value: u8) {
        if slot.bank() == BankId::Bank1 {
            let addr = self.address_for(slot);
            self.banks[1].store(slot.is_alt(), addr, value);
        }
        self.advance();
    }

    /// Slot an access to `bank` hits for the given AUDIN level.
    pub fn slot_for(&self, bank: BankId, audin: bool) -> BankSlot {
        match (bank, self.aux_input && audin) {
            (BankId::Bank0, false) => BankSlot::Bank0,
            (BankId::Bank0, true) => BankSlot::Bank0A,
            (BankId::Bank1, false) => BankSlot::Bank1,
            (BankId::Bank1, true) => BankSlot::Bank1A,
        }
    }

    // --- EEPROM lines ---

    /// Latch IODIR/IODAT for the EEPROM DI line.
    pub fn set_io(&mut self, iodir: u8, iodat: u8) {
        if let Some(eeprom) = &mut self.eeprom {
            eeprom.set_io(iodir, iodat);
        }
    }

    pub fn tick_busy(&mut self) {
        if let Some(eeprom) = &mut self.eeprom {
            eeprom.tick_busy();
        }
    }

    /// EEPROM DO line (low when no EEPROM is fitted).
    pub fn read_output(&self) -> bool {
        self.eeprom.as_ref().is_some_and(|e| e.read_output())
    }

    // --- Introspection ---

    pub fn shift_value(&self) -> u8 {
        self.shift_value
    }

    pub fn page_offset(&self) -> u16 {
        self.page_offset
    }

    pub fn bank_size(&self, bank: BankId) -> usize {
        self.banks[bank.index()].size()
    }

    pub fn has_aux_input(&self) -> bool {
        self.aux_input
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn eeprom(&self) -> Option<&Eeprom> {
        self.eeprom.as_ref()
    }

    pub fn eeprom_mut(&mut self) -> Option<&mut Eeprom> {
        self.eeprom.as_mut()
    }

    // --- Bank 1 RAM ---

    pub fn bank1_ram(&self) -> Option<&[u8]> {
        self.banks[1].ram()
    }

    /// Restore bank 1 RAM from an NVRAM image and clear the dirty flag.
    pub fn load_bank1_ram(&mut self, data: &[u8]) {
        self.banks[1].load_ram(data);
    }

    pub fn bank1_dirty(&self) -> bool {
        self.banks[1].is_dirty()
    }

    pub fn clear_bank1_dirty(&mut self) {
        self.banks[1].clear_dirty();
    }

    pub fn set_bank1_write_enabled(&mut self, enabled: bool) {
        self.banks[1].set_write_enabled(enabled);
    }

    // --- Save state ---

    /// Capture state for save state.
    pub fn save_state(&self) -> SaveState {
        SaveState {
            cart: CartState {
                shift_value: self.shift_value,
                page_offset: self.page_offset,
                strobe_level: self.strobe_level,
                bit_level: self.bit_level,
            },
            eeprom: self.eeprom.as_ref().map(|e| e.save_state()),
            bank1_ram: self.banks[1].ram().map(|ram| ram.to_vec()),
        }
    }

    /// Restore state from save state. Bank geometry is kept from the loaded
    /// cartridge.
    pub fn load_state(&mut self, s: &SaveState) {
        self.shift_value = s.cart.shift_value;
        self.page_offset = s.cart.page_offset & PAGE_OFFSET_MASK;
        self.strobe_level = s.cart.strobe_level;
        self.bit_level = s.cart.bit_level;

        match (&mut self.eeprom, &s.eeprom) {
            (Some(eeprom), Some(state)) => eeprom.load_state(state),
            (None, None) => {}
            _ => log::warn!("Save state EEPROM does not match the cartridge, skipped"),
        }

        if let Some(ram) = &s.bank1_ram {
            // Restored contents differ from the NVRAM file until it is written again
            self.banks[1].load_ram(ram);
            self.banks[1].mark_dirty();
        }
    }
}

impl Default for Cart {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for Cart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cart")
            .field("shift_value", &format_args!("{:#04x}", self.shift_value))
            .field("page_offset", &format_args!("{:#05x}", self.page_offset))
            .field("strobe", &self.strobe_level)
            .field("bit", &self.bit_level)
            .field("bank0", &self.banks[0].size())
            .field("bank1", &self.banks[1].size())
            .field("eeprom", &self.eeprom.as_ref().map(|e| e.kind()))
            .finish()
    }
}
