//! Save states and NVRAM files for the cartridge.
//!
//! Component state structs are serialized with bincode (fixed-width
//! little-endian integers, one byte per bool, `u64` length prefix on
//! vectors), so field order here is the on-disk order.
//!
//! ## Save state file
//!
//! ```text
//! +------------------+
//! | Magic "LXCS"     |  4 bytes
//! +------------------+
//! | Format version   |  u32 little-endian (currently 1)
//! +------------------+
//! | EEPROM code      |  u8 (0 = none, see EepromKind::code)
//! +------------------+
//! | Compressed data  |  deflate-compressed bincode payload
//! +------------------+
//! ```
//!
//! ## NVRAM files
//!
//! Raw images with no header: `game.eeprom` holds [`Eeprom::image`] and
//! `game.sram` holds the bank 1 RAM.
//!
//! [`Eeprom::image`]: crate::peripherals::Eeprom::image

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::peripherals::EepromKind;

/// Magic bytes identifying a cartridge save state file.
const MAGIC: &[u8; 4] = b"LXCS";
/// Current save state format version.
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 9;

// ─── Per-component state structs ────────────────────────────────────────────

/// Address shift register state. Bank geometry is not saved; it comes from
/// the cartridge on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartState {
    pub shift_value: u8,
    pub page_offset: u16,
    pub strobe_level: bool,
    pub bit_level: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EepromState {
    /// ProtocolState tag
    pub protocol_state: u8,
    pub shift_accumulator: u32,
    pub selected_address: u16,
    pub pending_read_value: u16,
    pub output_bit: bool,
    pub write_protected: bool,
    pub is_dirty: bool,
    pub in_programming_cycle: bool,
    pub busy_counter: u16,
    pub last_cs: bool,
    pub last_clk: bool,
    pub iodir: u8,
    pub iodat: u8,
    /// Addressable words only
    pub storage: Vec<u16>,
}

// ─── Top-level save state ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveState {
    pub cart: CartState,
    pub eeprom: Option<EepromState>,
    /// Bank 1 RAM contents, when bank 1 is RAM
    pub bank1_ram: Option<Vec<u8>>,
}

// ─── Encoding ───────────────────────────────────────────────────────────────

fn eeprom_code(state: &SaveState, eeprom: Option<EepromKind>) -> Result<u8> {
    match (eeprom, &state.eeprom) {
        (Some(kind), Some(_)) => Ok(kind.code()),
        (None, None) => Ok(0),
        _ => bail!("EEPROM kind does not match save state contents"),
    }
}

/// Encode a save state with header and deflate compression.
pub fn encode(state: &SaveState, eeprom: Option<EepromKind>) -> Result<Vec<u8>> {
    let code = eeprom_code(state, eeprom)?;
    let payload = bincode::serialize(state).context("Serialize error")?;

    let compressed = miniz_oxide::deflate::compress_to_vec(&payload, 6);

    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.push(code);
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Decode a save state, verifying magic, version, and EEPROM kind.
pub fn decode(data: &[u8], expected_eeprom: Option<EepromKind>) -> Result<SaveState> {
    if data.len() < HEADER_LEN {
        bail!("Save state too small ({} bytes)", data.len());
    }
    if &data[0..4] != MAGIC {
        bail!("Invalid save state (bad magic)");
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != FORMAT_VERSION {
        bail!("Unsupported save state version {} (expected {})", version, FORMAT_VERSION);
    }
    let code = data[8];
    let expected = expected_eeprom.map(|k| k.code()).unwrap_or(0);
    if code != expected {
        let name = |kind: Option<EepromKind>| kind.map(|k| k.name()).unwrap_or_else(|| "none".into());
        bail!("EEPROM mismatch: save={} current={}",
            name(EepromKind::from_code(code)), name(expected_eeprom));
    }

    let decompressed = miniz_oxide::inflate::decompress_to_vec(&data[HEADER_LEN..])
        .map_err(|e| anyhow::anyhow!("Decompress error: {:?}", e))?;

    let state: SaveState = bincode::deserialize(&decompressed).context("Deserialize error")?;
    if state.eeprom.is_some() != expected_eeprom.is_some() {
        bail!("Save state EEPROM section does not match header");
    }
    Ok(state)
}

// ─── File I/O ───────────────────────────────────────────────────────────────

/// Save state to file.
pub fn save_to_file(state: &SaveState, eeprom: Option<EepromKind>, path: &Path) -> Result<()> {
    let out = encode(state, eeprom)?;
    std::fs::write(path, out).with_context(|| format!("Write error: {}", path.display()))
}

/// Load state from file.
pub fn load_from_file(path: &Path, expected_eeprom: Option<EepromKind>) -> Result<SaveState> {
    let data = std::fs::read(path).with_context(|| format!("Read error: {}", path.display()))?;
    decode(&data, expected_eeprom).with_context(|| format!("Bad save state: {}", path.display()))
}

/// Derive save state file path from ROM path.
/// `game.lnx` → `game.state`
pub fn state_path(rom_path: &Path) -> PathBuf {
    nvram_path(rom_path, "state")
}

/// Sibling of the ROM with another extension, e.g. `game.lnx` → `game.eeprom`.
pub fn nvram_path(rom_path: &Path, ext: &str) -> PathBuf {
    let stem = rom_path.file_stem().and_then(|s| s.to_str()).unwrap_or("game");
    let dir = rom_path.parent().unwrap_or(Path::new("."));
    dir.join(format!("{}.{}", stem, ext))
}

/// Write a raw NVRAM image (EEPROM or bank 1 RAM).
pub fn write_nvram(path: &Path, data: &[u8]) -> Result<()> {
    std::fs::write(path, data).with_context(|| format!("Write error: {}", path.display()))?;
    log::info!("Saved {} bytes to {}", data.len(), path.display());
    Ok(())
}

/// Read a raw NVRAM image. A missing file is not an error.
pub fn read_nvram(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Read error: {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripherals::EepromChip;

    fn sample(with_eeprom: bool) -> SaveState {
        SaveState {
            cart: CartState { shift_value: 0x5A, page_offset: 0x123, strobe_level: true, bit_level: false },
            eeprom: with_eeprom.then(|| EepromState {
                protocol_state: 2,
                shift_accumulator: 0x1C3,
                selected_address: 9,
                pending_read_value: 0,
                output_bit: false,
                write_protected: false,
                is_dirty: true,
                in_programming_cycle: false,
                busy_counter: 100,
                last_cs: true,
                last_clk: false,
                iodir: 0x10,
                iodat: 0x10,
                storage: vec![0xFFFF; 128],
            }),
            bank1_ram: None,
        }
    }

    fn c46() -> Option<EepromKind> {
        Some(EepromKind::new(EepromChip::C46, false))
    }

    #[test]
    fn test_cart_state_layout() {
        let state = sample(false).cart;
        let bytes = bincode::serialize(&state).unwrap();
        assert_eq!(bytes, [0x5A, 0x23, 0x01, 0x01, 0x00]);
    }

    #[test]
    fn test_eeprom_state_layout() {
        let state = sample(true).eeprom.unwrap();
        let bytes = bincode::serialize(&state).unwrap();
        // Fixed fields, then u64 length prefix and the words
        assert_eq!(&bytes[..4], &[2, 0xC3, 0x01, 0x00]);
        assert_eq!(bytes.len(), 19 + 8 + 128 * 2);
        assert_eq!(&bytes[19..27], &128u64.to_le_bytes());
    }

    #[test]
    fn test_encode_decode() {
        let state = sample(true);
        let data = encode(&state, c46()).unwrap();
        assert_eq!(&data[0..4], MAGIC);
        assert_eq!(data[8], 1);
        assert_eq!(decode(&data, c46()).unwrap(), state);
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        let data = encode(&sample(true), c46()).unwrap();
        assert!(decode(&data[..5], c46()).is_err());

        let mut bad_magic = data.clone();
        bad_magic[0] = b'X';
        assert!(decode(&bad_magic, c46()).is_err());

        let mut bad_version = data.clone();
        bad_version[4] = 9;
        assert!(decode(&bad_version, c46()).is_err());

        assert!(decode(&data, None).is_err());

        let mut truncated = data.clone();
        truncated.truncate(HEADER_LEN + 2);
        assert!(decode(&truncated, c46()).is_err());
    }

    #[test]
    fn test_encode_rejects_mismatch() {
        assert!(encode(&sample(true), None).is_err());
        assert!(encode(&sample(false), c46()).is_err());
    }

    #[test]
    fn test_paths() {
        assert_eq!(state_path(Path::new("roms/game.lnx")), Path::new("roms/game.state"));
        assert_eq!(nvram_path(Path::new("game.lnx"), "eeprom"), Path::new("game.eeprom"));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = std::env::temp_dir().join(format!("lynx-cart-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let path = dir.join("game.state");
        let state = sample(true);
        save_to_file(&state, c46(), &path).unwrap();
        assert_eq!(load_from_file(&path, c46()).unwrap(), state);

        let nvram = dir.join("game.eeprom");
        assert_eq!(read_nvram(&nvram).unwrap(), None);
        write_nvram(&nvram, &[1, 2, 3]).unwrap();
        assert_eq!(read_nvram(&nvram).unwrap(), Some(vec![1, 2, 3]));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
