//! Where the loader looks for cached warmboot firmware
//!
//! Files are named after the *burnt* fuse count. The loader searches from the unit's burnt
//! count upwards, so this name is found even when the installed firmware is not recognized.

use std::path::{Path, PathBuf};

use crate::fuse::HardwareFamily;

/// Prefix the loader uses for the SD card filesystem
pub const SD_PREFIX: &str = "sd:";

/// `wb_XX.bin`, `XX` being the fuse count in two lowercase hex digits
#[must_use]
pub fn warmboot_file_name(fuse_count: u8) -> String {
    format!("wb_{fuse_count:02x}.bin")
}

/// Loader-side path, e.g. `sd:/warmboot_mariko/wb_16.bin`
#[must_use]
pub fn warmboot_path(family: HardwareFamily, fuse_count: u8) -> String {
    format!("{SD_PREFIX}/{}/{}", family.root_dir(), warmboot_file_name(fuse_count))
}

/// The same file below a mounted SD card
#[must_use]
pub fn warmboot_host_path(sd_root: &Path, family: HardwareFamily, fuse_count: u8) -> PathBuf {
    sd_root
        .join(family.root_dir())
        .join(warmboot_file_name(fuse_count))
}
