//! Firmware version to expected fuse count lookup
//!
//! Two tiers: an optional override table read from the SD card (`config/wb_db.txt`), and the
//! builtin table that mirrors the loader's own list of fuse-burning releases.

use std::fs;
use std::path::Path;

use log::{debug, info, warn};

use crate::firmware::FirmwareVersion;

/// Upper bound on override entries, anything past it is ignored
pub const MAX_DB_ENTRIES: usize = 64;

/// Location of the override table relative to the SD root
pub const DB_RELATIVE_PATH: &str = "config/wb_db.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuseVersionEntry {
    pub firmware_version: u32,
    pub fuse_count: u32,
}

const fn entry(firmware_version: u32, fuse_count: u32) -> FuseVersionEntry {
    FuseVersionEntry { firmware_version, fuse_count }
}

/// Releases that burnt an extra fuse, newest first. 18.0.0 did not.
pub static BUILTIN_TABLE: [FuseVersionEntry; 22] = [
    entry(0x1500, 22),
    entry(0x1400, 21),
    entry(0x1300, 20),
    entry(0x1100, 19),
    entry(0x1000, 18),
    entry(0xF00, 17),
    entry(0xD21, 16),
    entry(0xC02, 15),
    entry(0xB00, 14),
    entry(0xA00, 13),
    entry(0x910, 12),
    entry(0x900, 11),
    entry(0x810, 10),
    entry(0x700, 9),
    entry(0x620, 8),
    entry(0x600, 7),
    entry(0x500, 6),
    entry(0x400, 5),
    entry(0x302, 4),
    entry(0x300, 3),
    entry(0x200, 2),
    entry(0x100, 1),
];

fn first_match(table: &[FuseVersionEntry], firmware: u32) -> Option<u32> {
    table
        .iter()
        .find(|e| firmware >= e.firmware_version)
        .map(|e| e.fuse_count)
}

/// Fuse count lookup context
///
/// A loaded, non-empty override table always wins over the builtin one, even where the builtin
/// table knows newer releases. The builtin table is only consulted when nothing is loaded or no
/// override entry is low enough to match.
#[derive(Debug, Clone, Default)]
pub struct FuseDatabase {
    overrides: Vec<FuseVersionEntry>,
    loaded: bool,
}

impl FuseDatabase {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    /// Parses override text, one `HEX=DECIMAL` pair per line
    ///
    /// Comment lines (`#`), blank lines and lines that don't parse are skipped. Entries are kept
    /// in file order, the file is expected to be sorted newest first.
    #[must_use]
    pub fn parse_overrides(text: &str) -> Vec<FuseVersionEntry> {
        text.lines()
            .filter_map(parse_line)
            .take(MAX_DB_ENTRIES)
            .collect()
    }
    /// Loads overrides from a string. Returns whether an override table is in effect.
    ///
    /// Does nothing if a table is already loaded; call [`reset`](Self::reset) first to reload.
    pub fn load_from_str(&mut self, text: &str) -> bool {
        if self.loaded {
            return true;
        }

        self.overrides = Self::parse_overrides(text);
        self.loaded = !self.overrides.is_empty();
        if self.loaded {
            info!("Loaded {} fuse database overrides", self.overrides.len());
        }
        self.loaded
    }
    /// Loads overrides from a file, a missing or unreadable file only means the builtin table
    /// stays in use
    pub fn load_from_path(&mut self, path: impl AsRef<Path>) -> bool {
        if self.loaded {
            return true;
        }

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => self.load_from_str(&text),
            Err(err) => {
                debug!("No fuse database at {}: {err}", path.display());
                false
            }
        }
    }
    /// Loads `config/wb_db.txt` below an SD card root
    pub fn load_from_sd(&mut self, sd_root: impl AsRef<Path>) -> bool {
        self.load_from_path(sd_root.as_ref().join(DB_RELATIVE_PATH))
    }
    /// Drops any loaded overrides, falling back to the builtin table
    pub fn reset(&mut self) {
        self.overrides.clear();
        self.loaded = false;
    }
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
    #[must_use]
    pub fn overrides(&self) -> &[FuseVersionEntry] {
        &self.overrides
    }
    /// Number of fuses the given firmware expects to have burnt, 0 if older than every entry
    #[must_use]
    pub fn expected_fuse_count(&self, firmware: FirmwareVersion) -> u32 {
        let firmware = firmware.raw();
        if self.loaded {
            if let Some(count) = first_match(&self.overrides, firmware) {
                return count;
            }
            warn!("Fuse database has no entry for {firmware:#x}, using builtin table");
        }
        first_match(&BUILTIN_TABLE, firmware).unwrap_or(0)
    }
}

fn parse_line(line: &str) -> Option<FuseVersionEntry> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let key = key
        .strip_prefix("0x")
        .or_else(|| key.strip_prefix("0X"))
        .unwrap_or(key);
    let value = value.trim();
    // trailing text after the number is tolerated
    let digits = value
        .find(|c: char| !c.is_ascii_digit())
        .map_or(value, |end| &value[..end]);

    let firmware_version = u32::from_str_radix(key, 16).ok()?;
    let fuse_count = digits.parse().ok()?;
    Some(FuseVersionEntry { firmware_version, fuse_count })
}
