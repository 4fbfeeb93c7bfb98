//! # lynx-cart
//!
//! Cartridge port emulation for the Atari Lynx: the serial bank addressing
//! scheme used by Suzy's RCART0/RCART1 registers, and the 93Cxx Microwire
//! EEPROM some carts hang off the same lines.
//!
//! ## Architecture
//!
//! - [`Cart`] — Bank addressing engine: two banks (plus AUDIN alternates),
//!   8-bit address shift register, 11-bit page offset counter
//! - [`CartInfo`] — Geometry and device flags supplied by the cartridge loader
//! - [`bank`] — Bank geometry and ROM/RAM backing storage
//! - [`peripherals`] — 93C46/56/66/76/86 serial EEPROM
//! - [`savestate`] — Save state structs, compressed state files, NVRAM files
//!
//! ## Wiring
//!
//! ```text
//!  Mikey CART_ADDR_STROBE ──► Cart::strobe ──┐
//!  Mikey CART_ADDR_DATA   ──► Cart::set_bit  │ page offset counter
//!  Suzy RCART0/RCART1     ──► Cart::read/write ─┴──► Eeprom::notify_counter
//!  Mikey IODIR/IODAT      ──► Cart::set_io ────────► Eeprom DI (bit 4)
//!  Mikey AUDIN            ◄── Cart::read_output ◄── Eeprom DO
//! ```
//!
//! Everything runs on the emulation thread. [`Cart::peek`] is the only
//! access that leaves state untouched.

pub mod bank;
pub mod cart;
pub mod cart_info;
pub mod peripherals;
pub mod savestate;

pub use bank::{BankId, BankSlot, RomView};
pub use cart::Cart;
pub use cart_info::{CartInfo, Rotation};
pub use peripherals::{Eeprom, EepromChip, EepromKind};
pub use savestate::SaveState;

/// Bytes per cartridge page
pub const PAGE_BYTES: usize = 256;
/// Page offset counter width: 11 bits
pub const PAGE_OFFSET_MASK: u16 = 0x7FF;
/// Value read from an unused bank
pub const FILL_BYTE: u8 = 0xFF;
/// Shadow RAM in bank 1: 256 pages = 64 KB
pub const SHADOW_RAM_PAGES: u16 = 256;
