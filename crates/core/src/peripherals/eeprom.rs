//! 93Cxx Microwire serial EEPROM emulation for Lynx cartridges.
//!
//! The chip has no pins of its own on the cartridge port. Its lines are
//! borrowed from the cart address counter and the AUDIN pin:
//!
//! - CS  = counter bit 7
//! - CLK = counter bit 1
//! - DI  = IODAT bit 4 (only while IODIR bit 4 drives it as an output)
//! - DO  = [`Eeprom::read_output`], muxed onto AUDIN by the caller
//!
//! Supported commands (start bit, 2-bit opcode, address):
//! - `10`: READ  (16 or 8 data bits shifted out MSB first after a dummy 0)
//! - `01`: WRITE (16 or 8 data bits shifted in)
//! - `11`: ERASE (cell set to all ones)
//! - `00 11`: EWEN (write enable)
//! - `00 00`: EWDS (write disable)
//! - `00 01` / `00 10`: WRAL / ERAL (decoded, no effect)

use crate::savestate::EepromState;

/// Busy ticks after a WRITE or ERASE before DO reports ready.
pub const BUSY_TICKS: u16 = 100;
/// Storage ceiling in 16-bit words, shared by every variant.
pub const EEPROM_CAPACITY: usize = 1024;

const CS_LINE: u16 = 0x80;
const CLK_LINE: u16 = 0x02;
const DI_LINE: u8 = 0x10;

/// Accumulator value that completes a 16-bit data payload.
const WORD_DONE: u32 = 0x1_0000;
/// Accumulator value that completes an 8-bit data payload.
const BYTE_DONE: u32 = 0x100;

/// Chip family member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EepromChip {
    C46,
    C56,
    C66,
    C76,
    C86,
}

/// Fitted EEPROM: chip plus organisation.
///
/// In 8-bit organisation (ORG pin low) every cell is a byte, doubling the
/// cell count and adding one address bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EepromKind {
    pub chip: EepromChip,
    pub byte_mode: bool,
}

impl EepromKind {
    /// Organisation flag in the loader's EEPROM code.
    pub const BYTE_MODE_FLAG: u8 = 0x80;

    pub fn new(chip: EepromChip, byte_mode: bool) -> Self {
        EepromKind { chip, byte_mode }
    }

    /// Decode the loader's EEPROM code: low 3 bits select the chip
    /// (0 = none, 1..=5 = 93C46..93C86), bit 7 selects 8-bit organisation.
    /// Unknown chip numbers fall back to 93C46.
    pub fn from_code(code: u8) -> Option<Self> {
        let chip = match code & 0x07 {
            0 => return None,
            1 => EepromChip::C46,
            2 => EepromChip::C56,
            3 => EepromChip::C66,
            4 => EepromChip::C76,
            5 => EepromChip::C86,
            other => {
                log::warn!("Unknown EEPROM type {}, using 93C46", other);
                EepromChip::C46
            }
        };
        Some(EepromKind { chip, byte_mode: code & Self::BYTE_MODE_FLAG != 0 })
    }

    /// Inverse of [`EepromKind::from_code`].
    pub fn code(&self) -> u8 {
        let chip = match self.chip {
            EepromChip::C46 => 1,
            EepromChip::C56 => 2,
            EepromChip::C66 => 3,
            EepromChip::C76 => 4,
            EepromChip::C86 => 5,
        };
        if self.byte_mode { chip | Self::BYTE_MODE_FLAG } else { chip }
    }

    /// Address bits following the opcode.
    pub fn addr_bits(&self) -> u32 {
        let bits = match self.chip {
            EepromChip::C46 => 6,
            EepromChip::C56 | EepromChip::C66 => 8,
            EepromChip::C76 | EepromChip::C86 => 10,
        };
        if self.byte_mode { bits + 1 } else { bits }
    }

    /// Number of cells (words, or bytes in 8-bit organisation).
    pub fn size(&self) -> usize {
        let cells = self.words();
        if self.byte_mode { cells * 2 } else { cells }
    }

    /// Backing 16-bit words covered by [`EepromKind::size`].
    fn words(&self) -> usize {
        match self.chip {
            EepromChip::C46 => 128,
            EepromChip::C56 | EepromChip::C66 => 256,
            EepromChip::C76 | EepromChip::C86 => EEPROM_CAPACITY,
        }
    }

    pub fn name(&self) -> String {
        let chip = match self.chip {
            EepromChip::C46 => "93C46",
            EepromChip::C56 => "93C56",
            EepromChip::C66 => "93C66",
            EepromChip::C76 => "93C76",
            EepromChip::C86 => "93C86",
        };
        if self.byte_mode { format!("{} (8-bit)", chip) } else { chip.to_string() }
    }
}

/// Counter-driven protocol position. The post-write busy period is tracked
/// separately (see [`Eeprom::is_busy`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    /// Waiting for a start bit
    Idle,
    /// Collecting opcode + address
    Address,
    /// Collecting the WRITE payload
    Data,
    /// Shifting out READ data, or programming
    Wait,
}

impl ProtocolState {
    /// Integer tag used in save states.
    pub fn tag(self) -> u8 {
        match self {
            ProtocolState::Idle => 0,
            ProtocolState::Address => 1,
            ProtocolState::Data => 2,
            ProtocolState::Wait => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ProtocolState::Idle),
            1 => Some(ProtocolState::Address),
            2 => Some(ProtocolState::Data),
            3 => Some(ProtocolState::Wait),
            _ => None,
        }
    }
}

pub struct Eeprom {
    kind: EepromKind,
    addr_bits: u32,
    done_mask: u32,
    state: ProtocolState,
    /// Bits clocked in since the start bit (start bit included)
    shift: u32,
    address: u16,
    read_value: u16,
    output: bool,
    write_protected: bool,
    dirty: bool,
    /// WRITE/ERASE programming in progress
    programming: bool,
    busy_count: u16,
    last_cs: bool,
    last_clk: bool,
    iodir: u8,
    iodat: u8,
    /// Cell storage; 8-bit organisation addresses it bytewise, low byte first
    storage: Vec<u16>,
}

impl Eeprom {
    pub fn new(kind: EepromKind) -> Self {
        let addr_bits = kind.addr_bits();
        Eeprom {
            kind,
            addr_bits,
            done_mask: 1 << (addr_bits + 2),
            state: ProtocolState::Idle,
            shift: 0,
            address: 0,
            read_value: 0,
            output: false,
            write_protected: true,
            dirty: false,
            programming: false,
            busy_count: 0,
            last_cs: false,
            last_clk: false,
            iodir: 0,
            iodat: 0,
            storage: vec![0xFFFF; EEPROM_CAPACITY],
        }
    }

    /// Power-on reset: serial interface idle, write protected, every cell
    /// erased. Reload the NVRAM image afterwards to keep saves.
    pub fn reset(&mut self) {
        self.storage.fill(0xFFFF);
        self.dirty = false;
        self.state = ProtocolState::Idle;
        self.shift = 0;
        self.address = 0;
        self.read_value = 0;
        self.output = false;
        self.write_protected = true;
        self.programming = false;
        self.busy_count = 0;
        self.last_cs = false;
        self.last_clk = false;
        self.iodir = 0;
        self.iodat = 0;
    }

    pub fn kind(&self) -> EepromKind {
        self.kind
    }

    /// Addressable cells (see [`EepromKind::size`]).
    pub fn size(&self) -> usize {
        self.kind.size()
    }

    pub fn addr_bits(&self) -> u32 {
        self.addr_bits
    }

    pub fn protocol_state(&self) -> ProtocolState {
        self.state
    }

    pub fn is_write_protected(&self) -> bool {
        self.write_protected
    }

    pub fn is_busy(&self) -> bool {
        self.programming
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Latch the AUDIN direction/data registers that feed DI.
    pub fn set_io(&mut self, iodir: u8, iodat: u8) {
        self.iodir = iodir;
        self.iodat = iodat;
    }

    /// DO line: read data bit, or ready (high) / busy (low) after programming.
    pub fn read_output(&self) -> bool {
        self.output
    }

    /// Cell value at `addr` (masked), a byte in 8-bit organisation.
    pub fn cell(&self, addr: u16) -> u16 {
        let addr = addr & self.addr_mask();
        if self.kind.byte_mode {
            let word = self.storage[(addr >> 1) as usize];
            if addr & 1 == 0 { word & 0xFF } else { word >> 8 }
        } else {
            self.storage[addr as usize]
        }
    }

    fn set_cell(&mut self, addr: u16, value: u16) {
        let addr = addr & self.addr_mask();
        if self.kind.byte_mode {
            let word = &mut self.storage[(addr >> 1) as usize];
            *word = if addr & 1 == 0 {
                (*word & 0xFF00) | (value & 0xFF)
            } else {
                (*word & 0x00FF) | ((value & 0xFF) << 8)
            };
        } else {
            self.storage[addr as usize] = value;
        }
    }

    fn addr_mask(&self) -> u16 {
        ((1u32 << self.addr_bits) - 1) as u16
    }

    fn cell_mask(&self) -> u16 {
        if self.kind.byte_mode { 0x00FF } else { 0xFFFF }
    }

    /// Cart counter changed. Bit 7 is CS, bit 1 is CLK.
    pub fn notify_counter(&mut self, counter: u16) {
        let cs = counter & CS_LINE != 0;
        let clk = counter & CLK_LINE != 0;
        let di = self.iodat & self.iodir & DI_LINE != 0;

        // Either CS edge aborts whatever command was in flight
        if cs != self.last_cs {
            self.state = ProtocolState::Idle;
            self.shift = 0;
            self.last_cs = cs;
        }

        let rising = clk && !self.last_clk;
        self.last_clk = clk;
        if cs && rising {
            self.clock_in(di);
        }
    }

    fn clock_in(&mut self, di: bool) {
        if self.state == ProtocolState::Idle {
            if di {
                // Start bit
                self.shift = 1;
                self.state = ProtocolState::Address;
            }
            return;
        }

        self.shift = (self.shift << 1) | di as u32;

        match self.state {
            ProtocolState::Address => {
                if self.shift & self.done_mask != 0 {
                    self.decode_command();
                }
            }
            ProtocolState::Data => {
                let done = if self.kind.byte_mode { BYTE_DONE } else { WORD_DONE };
                if self.shift & done != 0 {
                    let value = (self.shift & (done - 1)) as u16;
                    if !self.write_protected {
                        self.set_cell(self.address, value);
                        self.dirty = true;
                    }
                    log::debug!("EEPROM WRITE [{:#05x}] = {:#06x}{}", self.address, value,
                        if self.write_protected { " (protected)" } else { "" });
                    self.begin_programming();
                    self.state = ProtocolState::Wait;
                }
            }
            ProtocolState::Wait => {
                if !self.programming {
                    let top = if self.kind.byte_mode { 0x80 } else { 0x8000 };
                    self.output = self.read_value & top != 0;
                    self.read_value = (self.read_value << 1) & self.cell_mask();
                }
            }
            ProtocolState::Idle => {}
        }
    }

    fn decode_command(&mut self) {
        let opcode = (self.shift >> self.addr_bits) & 0b11;
        let address = self.shift as u16 & self.addr_mask();

        match opcode {
            0b10 => {
                self.address = address;
                self.read_value = self.cell(address);
                self.output = false; // dummy 0 before the data
                log::debug!("EEPROM READ [{:#05x}] = {:#06x}", address, self.read_value);
                self.state = ProtocolState::Wait;
            }
            0b01 => {
                self.address = address;
                self.shift = 1;
                self.state = ProtocolState::Data;
            }
            0b11 => {
                self.address = address;
                if !self.write_protected {
                    self.set_cell(address, self.cell_mask());
                    self.dirty = true;
                }
                log::debug!("EEPROM ERASE [{:#05x}]{}", address,
                    if self.write_protected { " (protected)" } else { "" });
                self.begin_programming();
                self.state = ProtocolState::Wait;
            }
            _ => {
                match (self.shift >> (self.addr_bits - 2)) & 0b11 {
                    0b00 => {
                        log::debug!("EEPROM EWDS");
                        self.write_protected = true;
                    }
                    0b11 => {
                        log::debug!("EEPROM EWEN");
                        self.write_protected = false;
                    }
                    0b01 => log::debug!("EEPROM WRAL ignored"),
                    _ => log::debug!("EEPROM ERAL ignored"),
                }
                self.state = ProtocolState::Idle;
            }
        }
    }

    fn begin_programming(&mut self) {
        self.busy_count = 0;
        self.programming = true;
        self.output = false;
    }

    /// Advance the programming timer by one tick.
    pub fn tick_busy(&mut self) {
        if self.programming && self.busy_count < BUSY_TICKS {
            self.busy_count += 1;
            if self.busy_count == BUSY_TICKS {
                self.output = true;
                self.programming = false;
                log::debug!("EEPROM ready");
            }
        }
    }

    /// Fill every cell with the erased value.
    pub fn erase(&mut self) {
        self.storage.fill(0xFFFF);
        self.dirty = true;
    }

    /// Addressable storage as little-endian bytes, as written to NVRAM files.
    pub fn image(&self) -> Vec<u8> {
        self.storage[..self.kind.words()]
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .collect()
    }

    /// Replace storage with an NVRAM image. Missing bytes read as erased.
    pub fn load_image(&mut self, data: &[u8]) {
        let expected = self.kind.words() * 2;
        if data.len() != expected {
            log::warn!("EEPROM image is {} bytes, {} expects {}", data.len(),
                self.kind.name(), expected);
        }
        self.storage.fill(0xFFFF);
        for (word, bytes) in self.storage[..self.kind.words()].iter_mut().zip(data.chunks(2)) {
            *word = match bytes {
                [lo, hi] => u16::from_le_bytes([*lo, *hi]),
                [lo] => 0xFF00 | *lo as u16,
                _ => 0xFFFF,
            };
        }
        self.dirty = false;
    }

    /// Capture state for save state.
    pub fn save_state(&self) -> EepromState {
        EepromState {
            protocol_state: self.state.tag(),
            shift_accumulator: self.shift,
            selected_address: self.address,
            pending_read_value: self.read_value,
            output_bit: self.output,
            write_protected: self.write_protected,
            is_dirty: self.dirty,
            in_programming_cycle: self.programming,
            busy_counter: self.busy_count,
            last_cs: self.last_cs,
            last_clk: self.last_clk,
            iodir: self.iodir,
            iodat: self.iodat,
            storage: self.storage[..self.kind.words()].to_vec(),
        }
    }

    /// Restore state from save state.
    pub fn load_state(&mut self, s: &EepromState) {
        self.state = ProtocolState::from_tag(s.protocol_state).unwrap_or_else(|| {
            log::warn!("Unknown EEPROM protocol state {}, using idle", s.protocol_state);
            ProtocolState::Idle
        });
        self.shift = s.shift_accumulator;
        self.address = s.selected_address & self.addr_mask();
        self.read_value = s.pending_read_value;
        self.output = s.output_bit;
        self.write_protected = s.write_protected;
        self.dirty = s.is_dirty;
        self.programming = s.in_programming_cycle;
        self.busy_count = s.busy_counter.min(BUSY_TICKS);
        self.last_cs = s.last_cs;
        self.last_clk = s.last_clk;
        self.iodir = s.iodir;
        self.iodat = s.iodat;
        self.storage.fill(0xFFFF);
        let len = s.storage.len().min(EEPROM_CAPACITY);
        self.storage[..len].copy_from_slice(&s.storage[..len]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CS: u16 = 0x80;
    const CLK: u16 = 0x02;

    fn select(ee: &mut Eeprom) {
        ee.notify_counter(0);
        ee.notify_counter(CS);
    }

    fn deselect(ee: &mut Eeprom) {
        ee.notify_counter(0);
    }

    fn clock(ee: &mut Eeprom, bit: bool) {
        ee.set_io(0x10, if bit { 0x10 } else { 0 });
        ee.notify_counter(CS);
        ee.notify_counter(CS | CLK);
        ee.notify_counter(CS);
    }

    fn send(ee: &mut Eeprom, value: u32, bits: u32) {
        for i in (0..bits).rev() {
            clock(ee, value >> i & 1 != 0);
        }
    }

    /// Start bit, opcode and address (the address carries the sub-opcode
    /// for extended commands).
    fn command(ee: &mut Eeprom, opcode: u32, addr: u32) {
        select(ee);
        clock(ee, true);
        send(ee, opcode, 2);
        send(ee, addr, ee.addr_bits());
    }

    fn ewen(ee: &mut Eeprom) {
        let bits = ee.addr_bits();
        command(ee, 0b00, 0b11 << (bits - 2));
        deselect(ee);
    }

    fn write(ee: &mut Eeprom, addr: u32, value: u32) {
        command(ee, 0b01, addr);
        send(ee, value, if ee.kind().byte_mode { 8 } else { 16 });
        deselect(ee);
        for _ in 0..BUSY_TICKS {
            ee.tick_busy();
        }
    }

    fn read(ee: &mut Eeprom, addr: u32) -> u32 {
        command(ee, 0b10, addr);
        let bits = if ee.kind().byte_mode { 8 } else { 16 };
        let mut value = 0;
        for _ in 0..bits {
            clock(ee, false);
            value = (value << 1) | ee.read_output() as u32;
        }
        deselect(ee);
        value
    }

    fn c46() -> Eeprom {
        Eeprom::new(EepromKind::new(EepromChip::C46, false))
    }

    #[test]
    fn test_kind_geometry() {
        let k = EepromKind::from_code(1).unwrap();
        assert_eq!(k.addr_bits(), 6);
        assert_eq!(k.size(), 128);
        let k = EepromKind::from_code(0x83).unwrap();
        assert_eq!(k.chip, EepromChip::C66);
        assert!(k.byte_mode);
        assert_eq!(k.addr_bits(), 9);
        assert_eq!(k.size(), 512);
        let k = EepromKind::from_code(5).unwrap();
        assert_eq!(k.addr_bits(), 10);
        assert_eq!(k.size(), 1024);
        assert_eq!(k.code(), 5);
        assert!(EepromKind::from_code(0).is_none());
        // Unknown chip numbers fall back to the smallest part
        assert_eq!(EepromKind::from_code(7).unwrap().chip, EepromChip::C46);
        assert_eq!(EepromKind::from_code(0x81).unwrap().name(), "93C46 (8-bit)");
    }

    #[test]
    fn test_done_mask() {
        let ee = c46();
        assert_eq!(ee.done_mask, 0x100);
        assert!(ee.is_write_protected());
        assert_eq!(ee.cell(5), 0xFFFF);
    }

    #[test]
    fn test_write_read_93c46() {
        let mut ee = c46();
        ewen(&mut ee);
        assert!(!ee.is_write_protected());

        command(&mut ee, 0b01, 5);
        assert_eq!(ee.protocol_state(), ProtocolState::Data);
        send(&mut ee, 0b1010_1010_1010_1010, 16);
        assert_eq!(ee.protocol_state(), ProtocolState::Wait);
        assert!(ee.is_busy());
        assert_eq!(ee.cell(5), 0xAAAA);
        assert!(ee.is_dirty());
        deselect(&mut ee);

        for _ in 0..BUSY_TICKS - 1 {
            ee.tick_busy();
            assert!(!ee.read_output());
        }
        ee.tick_busy();
        assert!(ee.read_output());
        assert!(!ee.is_busy());

        // Dummy zero, then MSB first
        command(&mut ee, 0b10, 5);
        assert!(!ee.read_output());
        let mut bits = Vec::new();
        for _ in 0..16 {
            clock(&mut ee, false);
            bits.push(ee.read_output() as u8);
        }
        assert_eq!(bits, [1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_write_without_ewen_is_ignored() {
        let mut ee = c46();
        write(&mut ee, 5, 0x1234);
        assert!(ee.read_output());
        assert_eq!(ee.cell(5), 0xFFFF);
        assert!(!ee.is_dirty());
        assert_eq!(read(&mut ee, 5), 0xFFFF);
    }

    #[test]
    fn test_ewds_protects_again() {
        let mut ee = c46();
        ewen(&mut ee);
        write(&mut ee, 1, 0x0001);
        command(&mut ee, 0b00, 0b00 << 4);
        deselect(&mut ee);
        assert!(ee.is_write_protected());
        write(&mut ee, 1, 0x0002);
        assert_eq!(ee.cell(1), 0x0001);
    }

    #[test]
    fn test_erase() {
        let mut ee = c46();
        command(&mut ee, 0b11, 3);
        deselect(&mut ee);
        assert_eq!(ee.cell(3), 0xFFFF);
        assert!(!ee.is_dirty());

        ewen(&mut ee);
        write(&mut ee, 3, 0x0000);
        ee.clear_dirty();
        command(&mut ee, 0b11, 3);
        deselect(&mut ee);
        assert_eq!(ee.cell(3), 0xFFFF);
        assert!(ee.is_dirty());
        assert!(ee.is_busy());
        for _ in 0..BUSY_TICKS - 1 {
            ee.tick_busy();
        }
        assert!(!ee.read_output());
        ee.tick_busy();
        assert!(ee.read_output());
        // Extra ticks are harmless
        ee.tick_busy();
        assert!(ee.read_output());
    }

    #[test]
    fn test_wral_eral_are_noops() {
        let mut ee = c46();
        ewen(&mut ee);
        write(&mut ee, 0, 0x1111);
        command(&mut ee, 0b00, 0b01 << 4);
        assert_eq!(ee.protocol_state(), ProtocolState::Idle);
        deselect(&mut ee);
        command(&mut ee, 0b00, 0b10 << 4);
        deselect(&mut ee);
        assert_eq!(ee.cell(0), 0x1111);
        assert_eq!(ee.cell(1), 0xFFFF);
    }

    #[test]
    fn test_cs_edge_aborts_command() {
        let mut ee = c46();
        ewen(&mut ee);
        command(&mut ee, 0b01, 7);
        send(&mut ee, 0x12, 8);
        deselect(&mut ee);
        assert_eq!(ee.protocol_state(), ProtocolState::Idle);
        assert_eq!(ee.cell(7), 0xFFFF);
    }

    #[test]
    fn test_clock_ignored_without_cs() {
        let mut ee = c46();
        ee.set_io(0x10, 0x10);
        ee.notify_counter(0);
        ee.notify_counter(CLK);
        assert_eq!(ee.protocol_state(), ProtocolState::Idle);
    }

    #[test]
    fn test_di_gated_by_direction() {
        let mut ee = c46();
        select(&mut ee);
        // Data bit set but pin configured as input: no start bit
        ee.set_io(0x00, 0x10);
        ee.notify_counter(CS | CLK);
        assert_eq!(ee.protocol_state(), ProtocolState::Idle);
    }

    #[test]
    fn test_byte_mode() {
        let mut ee = Eeprom::new(EepromKind::new(EepromChip::C46, true));
        assert_eq!(ee.addr_bits(), 7);
        ewen(&mut ee);
        write(&mut ee, 0x7F, 0xA5);
        write(&mut ee, 0x7E, 0x3C);
        assert_eq!(ee.cell(0x7F), 0xA5);
        assert_eq!(ee.cell(0x7E), 0x3C);
        assert_eq!(read(&mut ee, 0x7F), 0xA5);
        // Bytes share the backing word, low byte first
        assert_eq!(ee.storage[0x3F], 0xA53C);
    }

    #[test]
    fn test_image_round_trip() {
        let mut ee = c46();
        ewen(&mut ee);
        write(&mut ee, 2, 0xBEEF);
        let image = ee.image();
        assert_eq!(image.len(), 256);
        assert_eq!(&image[4..6], &[0xEF, 0xBE]);

        let mut other = c46();
        other.load_image(&image);
        assert_eq!(other.cell(2), 0xBEEF);
        assert!(!other.is_dirty());

        other.load_image(&[0x34, 0x12, 0x56]);
        assert_eq!(other.cell(0), 0x1234);
        assert_eq!(other.cell(1), 0xFF56);
        assert_eq!(other.cell(2), 0xFFFF);
    }

    #[test]
    fn test_snapshot_mid_write() {
        let mut ee = c46();
        ewen(&mut ee);
        command(&mut ee, 0b01, 9);
        send(&mut ee, 0xC3, 8);
        let snap = ee.save_state();
        assert_eq!(snap.protocol_state, ProtocolState::Data.tag());
        assert_eq!(snap.storage.len(), 128);

        let mut restored = c46();
        restored.load_state(&snap);
        send(&mut restored, 0x5A, 8);
        deselect(&mut restored);
        send(&mut ee, 0x5A, 8);
        deselect(&mut ee);
        assert_eq!(restored.cell(9), 0xC35A);
        assert_eq!(restored.cell(9), ee.cell(9));
        assert_eq!(restored.save_state().storage, ee.save_state().storage);
    }

    #[test]
    fn test_reset_erases_cells() {
        let mut ee = c46();
        ewen(&mut ee);
        write(&mut ee, 4, 0x0F0F);
        assert!(ee.is_dirty());
        ee.reset();
        assert!(ee.is_write_protected());
        assert!(!ee.is_dirty());
        assert_eq!(ee.protocol_state(), ProtocolState::Idle);
        assert_eq!(ee.cell(4), 0xFFFF);
        assert!(ee.image().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_load_state_erases_missing_words() {
        let mut ee = c46();
        ewen(&mut ee);
        write(&mut ee, 100, 0x1234);
        let mut snap = ee.save_state();
        snap.storage.truncate(64);
        ee.load_state(&snap);
        assert_eq!(ee.cell(100), 0xFFFF);
        assert_eq!(ee.image().len(), 256);
    }

    #[test]
    fn test_byte_mode_erase_keeps_neighbour() {
        let mut ee = Eeprom::new(EepromKind::new(EepromChip::C46, true));
        ewen(&mut ee);
        write(&mut ee, 0x10, 0x00);
        write(&mut ee, 0x11, 0x5A);
        command(&mut ee, 0b11, 0x10);
        deselect(&mut ee);
        assert_eq!(ee.cell(0x10), 0xFF);
        assert_eq!(ee.cell(0x11), 0x5A);
        assert_eq!(ee.storage[0x08], 0x5AFF);
    }

    #[test]
    fn test_snapshot_mid_read() {
        let mut ee = c46();
        ewen(&mut ee);
        write(&mut ee, 6, 0xB00C);
        command(&mut ee, 0b10, 6);
        let mut first = 0u32;
        for _ in 0..5 {
            clock(&mut ee, false);
            first = (first << 1) | ee.read_output() as u32;
        }
        let snap = ee.save_state();
        assert_eq!(snap.protocol_state, ProtocolState::Wait.tag());

        let mut restored = c46();
        restored.load_state(&snap);
        assert_eq!(restored.read_output(), ee.read_output());
        let mut value = first;
        for _ in 0..11 {
            clock(&mut restored, false);
            value = (value << 1) | restored.read_output() as u32;
        }
        assert_eq!(value, 0xB00C);
    }
}
