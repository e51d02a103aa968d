//! Physical offsets and key slots the extractor works with
//!
//! Real consoles always use [`Layout::default`]; the fields are public so that synthetic
//! containers can be laid out differently in tests.

use crate::platform::Partition;

/// eMMC block size
pub const BLOCK_SIZE: u32 = 0x200;
/// Package1 starts 1 MiB into BOOT0
pub const PACKAGE1_OFFSET: u32 = 0x10_0000;
pub const PACKAGE1_SIZE: u32 = 0x4_0000;
/// Unencrypted prefix in front of the Mariko Package1
pub const MARIKO_HEADER_SIZE: usize = 0x170;
/// IV location, relative to the Mariko Package1
pub const IV_OFFSET: usize = 0x10;
/// Start of the ciphertext, relative to the Mariko Package1
pub const PAYLOAD_OFFSET: usize = 0x20;
/// Bytes compared against their decrypted copy to verify the key
pub const VERIFY_SIZE: usize = 0x20;
/// Candidate PK11 locations, older firmware first
pub const PK11_OFFSETS: [usize; 2] = [0x4000, 0x7000];
/// From this firmware on the PK11 header sits at the second candidate
pub const PK11_MOVED_IN: u32 = 0x620;
/// Mariko boot encryption key
pub const KS_MARIKO_BEK: u8 = 13;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub block_size: u32,
    pub partition: Partition,
    pub package1_offset: u32,
    pub package1_size: u32,
    pub header_size: usize,
    pub iv_offset: usize,
    pub payload_offset: usize,
    pub verify_size: usize,
    pub pk11_offsets: [usize; 2],
    pub pk11_moved_in: u32,
    pub key_slot: u8,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            block_size: BLOCK_SIZE,
            partition: Partition::Boot0,
            package1_offset: PACKAGE1_OFFSET,
            package1_size: PACKAGE1_SIZE,
            header_size: MARIKO_HEADER_SIZE,
            iv_offset: IV_OFFSET,
            payload_offset: PAYLOAD_OFFSET,
            verify_size: VERIFY_SIZE,
            pk11_offsets: PK11_OFFSETS,
            pk11_moved_in: PK11_MOVED_IN,
            key_slot: KS_MARIKO_BEK,
        }
    }
}

impl Layout {
    #[must_use]
    pub fn start_block(&self) -> u32 {
        self.package1_offset / self.block_size
    }
    #[must_use]
    pub fn block_count(&self) -> u32 {
        self.package1_size / self.block_size
    }
    /// Bytes actually read from storage, whole blocks only
    #[must_use]
    pub fn read_size(&self) -> usize {
        self.block_count() as usize * self.block_size as usize
    }
    /// PK11 candidates in the order to try them, given a firmware hint
    #[must_use]
    pub fn pk11_search_order(&self, firmware: u32) -> [usize; 2] {
        let [old, new] = self.pk11_offsets;
        if firmware != 0 && firmware >= self.pk11_moved_in {
            [new, old]
        } else {
            [old, new]
        }
    }
}
