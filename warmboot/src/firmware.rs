use std::fmt;

/// Target firmware version, encoded as `0xMMmp` (major, minor nibble, micro nibble)
///
/// A value of zero means the Package1 was not recognized. That is never an error: extraction
/// works from fuse counts alone, this is only used for naming hints and display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct FirmwareVersion(u32);

impl FirmwareVersion {
    pub const UNKNOWN: Self = Self(0);

    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }
    #[must_use]
    pub fn is_known(self) -> bool {
        self.0 != 0
    }
    #[must_use]
    pub fn major(self) -> u32 {
        self.0 >> 8
    }
    #[must_use]
    pub fn minor(self) -> u32 {
        (self.0 >> 4) & 0xf
    }
    #[must_use]
    pub fn micro(self) -> u32 {
        self.0 & 0xf
    }
}

impl From<u32> for FirmwareVersion {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.is_known() {
            return f.write_str("unknown");
        }
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.micro())
    }
}

struct KnownRelease {
    version_byte: u8,
    // None matches any date
    date: Option<&'static [u8; 8]>,
    firmware: u32,
}

const fn any(version_byte: u8, firmware: u32) -> KnownRelease {
    KnownRelease { version_byte, date: None, firmware }
}

const fn dated(version_byte: u8, date: &'static [u8; 8], firmware: u32) -> KnownRelease {
    KnownRelease { version_byte, date: Some(date), firmware }
}

// Package1 version byte was only bumped until 7.0.0; later releases share 0x10 and are told
// apart by their build date.
static KNOWN_RELEASES: [KnownRelease; 27] = [
    any(0x01, 0x100),
    any(0x02, 0x200),
    any(0x04, 0x300),
    any(0x07, 0x400),
    any(0x0B, 0x500),
    dated(0x0E, b"20180802", 0x600),
    dated(0x0E, b"20181107", 0x620),
    any(0x0F, 0x700),
    dated(0x10, b"20190314", 0x800),
    dated(0x10, b"20190531", 0x810),
    dated(0x10, b"20190809", 0x900),
    dated(0x10, b"20191021", 0x910),
    dated(0x10, b"20200303", 0xA00),
    dated(0x10, b"20201030", 0xB00),
    dated(0x10, b"20210129", 0xC00),
    dated(0x10, b"20210422", 0xC02),
    dated(0x10, b"20210607", 0xC10),
    dated(0x10, b"20210805", 0xD00),
    dated(0x10, b"20220105", 0xD21),
    dated(0x10, b"20220209", 0xE00),
    dated(0x10, b"20220801", 0xF00),
    dated(0x10, b"20230111", 0x1000),
    dated(0x10, b"20230906", 0x1100),
    dated(0x10, b"20240207", 0x1200),
    dated(0x10, b"20240808", 0x1300),
    dated(0x10, b"20250206", 0x1400),
    dated(0x10, b"20251009", 0x1500),
];

/// Maps the Package1 version byte and build date to a target firmware
///
/// Returns [`FirmwareVersion::UNKNOWN`] for anything not in the table.
#[must_use]
pub fn identify(version_byte: u8, date: &[u8; 8]) -> FirmwareVersion {
    KNOWN_RELEASES
        .iter()
        .find(|rel| rel.version_byte == version_byte && rel.date.map_or(true, |d| d == date))
        .map_or(FirmwareVersion::UNKNOWN, |rel| FirmwareVersion(rel.firmware))
}

/// Iterates over every `(version byte, date, firmware)` triple the identifier knows about
pub fn known_releases() -> impl Iterator<Item = (u8, Option<&'static [u8; 8]>, FirmwareVersion)> {
    KNOWN_RELEASES
        .iter()
        .map(|rel| (rel.version_byte, rel.date, FirmwareVersion(rel.firmware)))
}
