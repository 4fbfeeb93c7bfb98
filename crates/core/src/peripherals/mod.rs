//! Devices attached to the cartridge port.
//!
//! Lynx cartridges expose no dedicated pins for extra hardware, so anything
//! beyond ROM/RAM rides on existing lines:
//!
//! - [`Eeprom`] — 93C46/56/66/76/86 Microwire EEPROM clocked by the cart
//!   address counter, data in/out via the AUDIN pin

mod eeprom;

pub use eeprom::{Eeprom, EepromChip, EepromKind, ProtocolState, BUSY_TICKS, EEPROM_CAPACITY};
