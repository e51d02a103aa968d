use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::info;

use crate::extract::Extraction;
use crate::path::warmboot_host_path;
use crate::warmboot::Warmboot;
use crate::{Result, WarmbootError};

/// Writes the blob to `path` as-is, size prefix included, replacing any existing file
pub fn write_warmboot(path: &Path, warmboot: &Warmboot) -> Result<()> {
    let bytes = warmboot.as_bytes();
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;

    let written = fs::metadata(path)?.len() as usize;
    if written != bytes.len() {
        return Err(WarmbootError::ShortWrite {
            written,
            expected: bytes.len(),
        });
    }
    Ok(())
}

/// Stores an extraction under `sd_root` where the loader will look for it
///
/// Creates the family directory if needed and returns the path written.
pub fn save_to_sd(sd_root: &Path, extraction: &Extraction) -> Result<PathBuf> {
    let path = warmboot_host_path(sd_root, extraction.family, extraction.burnt_fuses);
    fs::create_dir_all(sd_root.join(extraction.family.root_dir()))?;
    write_warmboot(&path, &extraction.warmboot)?;
    info!("Saved warmboot to {}", path.display());
    Ok(path)
}
