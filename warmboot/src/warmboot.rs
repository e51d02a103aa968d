use std::ops::Range;

use derivative::Derivative;
use log::debug;

use crate::pk11::read_u32;
use crate::platform::BufferAllocator;
use crate::{Result, WarmbootError};

/// Accepted warmboot sizes, size prefix included
pub const WARMBOOT_SIZE_RANGE: Range<u32> = 0x800..0x1000;
pub const WARMBOOT_MIN_SIZE: u32 = WARMBOOT_SIZE_RANGE.start;
pub const WARMBOOT_MAX_SIZE: u32 = WARMBOOT_SIZE_RANGE.end;

/// "WBT0"
pub const WBT0_MAGIC: u32 = 0x3054_4257;

/// A warmboot firmware blob as the loader expects it on disk
///
/// The first word is the total size of the blob, itself included.
#[derive(Derivative, Clone, PartialEq, Eq)]
#[derivative(Debug)]
pub struct Warmboot {
    size: u32,
    #[derivative(Debug = "ignore")]
    data: Vec<u8>,
}

impl Warmboot {
    /// Validates the size word at `offset` and copies the blob out of `view`
    ///
    /// The output buffer comes from `allocator` but is owned by the caller afterwards.
    pub fn package<A: BufferAllocator + ?Sized>(view: &[u8], offset: usize, allocator: &A) -> Result<Self> {
        let size = read_u32(view, offset)?;
        if !WARMBOOT_SIZE_RANGE.contains(&size) {
            return Err(WarmbootError::ImageSizeOutOfRange { size });
        }

        let len = size as usize;
        let src = view
            .get(offset..)
            .and_then(|rest| rest.get(..len))
            .ok_or(WarmbootError::ContainerTruncated { offset: offset + len })?;
        let mut data = allocator
            .allocate(len)
            .ok_or(WarmbootError::OutputAllocationFailure(len))?;
        data.copy_from_slice(src);
        debug!("Packaged {size:#x} byte warmboot from {offset:#x}");

        Ok(Self { size, data })
    }
    /// Total size, equal to the leading size word
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }
    /// Everything that goes into `wb_XX.bin`
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
    /// The firmware without its size prefix
    #[must_use]
    pub fn image(&self) -> &[u8] {
        &self.data[4..]
    }
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
    /// First 16 bytes of the blob
    #[must_use]
    pub fn preview(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out.copy_from_slice(&self.data[..16]);
        out
    }
    /// Metadata block that newer warmboot firmware carries right after the size word
    #[must_use]
    pub fn metadata(&self) -> Option<WarmbootMetadata> {
        let magic = read_u32(&self.data, 4).ok()?;
        if magic != WBT0_MAGIC {
            return None;
        }
        Some(WarmbootMetadata {
            target_firmware: read_u32(&self.data, 8).ok()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmbootMetadata {
    pub target_firmware: u32,
}
