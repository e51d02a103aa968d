//! Extraction of the Mariko warmboot firmware from Package1
//!
//! The BOOT0 copy of Package1 is decrypted with the boot encryption key, the PK11 container
//! inside it is walked to the warmboot image, and the image is stored on the SD card as
//! `warmboot_mariko/wb_XX.bin`, named after the unit's burnt fuse count.

pub mod error;
pub mod extract;
pub mod firmware;
pub mod fuse;
pub mod fusedb;
pub mod layout;
pub mod package1;
pub mod path;
pub mod persist;
pub mod pk11;
pub mod platform;
pub mod storage;
pub mod string;
pub mod warmboot;

#[cfg(feature = "crypto")]
pub mod crypto;
#[cfg(feature = "hash")]
pub mod hash;

pub use error::WarmbootError;
pub use extract::{Diagnostics, Extraction, Extractor, FuseComparison, LayoutVariant};

pub type Result<T> = std::result::Result<T, WarmbootError>;

pub mod prelude {
    pub use crate::extract::{Diagnostics, Extraction, Extractor, FuseComparison, LayoutVariant};
    pub use crate::firmware::{identify, FirmwareVersion};
    pub use crate::fuse::{burnt_fuses, HardwareFamily, StaticFuses};
    pub use crate::fusedb::FuseDatabase;
    pub use crate::layout::Layout;
    pub use crate::path::{warmboot_host_path, warmboot_path};
    pub use crate::persist::save_to_sd;
    pub use crate::platform::{BlockStorage, BufferAllocator, CipherEngine, FuseRegisters, HeapAllocator, Partition};
    pub use crate::storage::ImageStorage;
    pub use crate::warmboot::Warmboot;
    pub use crate::WarmbootError;

    #[cfg(feature = "crypto")]
    pub use crate::crypto::{KeyBag, SoftwareCipher};
}
