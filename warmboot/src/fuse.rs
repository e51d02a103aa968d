use std::fmt;

use crate::platform::FuseRegisters;

/// ODM words that count anti-downgrade fuses
pub const FUSE_ODM_WORDS: [u32; 2] = [6, 7];

/// DRAM ids from this value on belong to T210B01 parts
pub const MARIKO_MIN_DRAM_ID: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareFamily {
    /// T210, warmboot ships embedded in the loader
    Erista,
    /// T210B01, warmboot has to be pulled out of Package1
    Mariko,
}

impl HardwareFamily {
    #[must_use]
    pub fn from_dram_id(dram_id: u32) -> Self {
        if dram_id >= MARIKO_MIN_DRAM_ID {
            Self::Mariko
        } else {
            Self::Erista
        }
    }
    #[must_use]
    pub fn detect<F: FuseRegisters + ?Sized>(fuses: &F) -> Self {
        Self::from_dram_id(fuses.dram_id())
    }
    #[must_use]
    pub fn is_mariko(self) -> bool {
        self == Self::Mariko
    }
    /// Directory on the SD card the loader looks for cached warmboot firmware in
    #[must_use]
    pub fn root_dir(self) -> &'static str {
        match self {
            Self::Erista => "warmboot_erista",
            Self::Mariko => "warmboot_mariko",
        }
    }
    #[must_use]
    pub fn soc_name(self) -> &'static str {
        match self {
            Self::Erista => "Erista (T210)",
            Self::Mariko => "Mariko (T210B01)",
        }
    }
}

impl fmt::Display for HardwareFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.soc_name())
    }
}

/// Number of anti-downgrade fuses burnt on this unit
#[must_use]
pub fn burnt_fuses<F: FuseRegisters + ?Sized>(fuses: &F) -> u8 {
    FUSE_ODM_WORDS
        .iter()
        .map(|&idx| fuses.read_odm(idx).count_ones() as u8)
        .sum()
}

/// Fuse values supplied up front, e.g. from a fuse dump or the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticFuses {
    pub odm: [u32; 8],
    pub dram_id: u32,
}

impl StaticFuses {
    #[must_use]
    pub fn new(odm6: u32, odm7: u32, dram_id: u32) -> Self {
        let mut odm = [0; 8];
        odm[6] = odm6;
        odm[7] = odm7;
        Self { odm, dram_id }
    }
}

impl FuseRegisters for StaticFuses {
    fn read_odm(&self, index: u32) -> u32 {
        self.odm.get(index as usize).copied().unwrap_or(0)
    }
    fn dram_id(&self) -> u32 {
        self.dram_id
    }
}
