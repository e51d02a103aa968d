//! Hardware collaborators the extractor drives
//!
//! Everything here is blocking. The extractor assumes exclusive use of the storage controller
//! and the cipher engine for the duration of a run.

use std::fmt;
use std::io;

use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Gpp,
    Boot0,
    Boot1,
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Gpp => "GPP",
            Self::Boot0 => "BOOT0",
            Self::Boot1 => "BOOT1",
        })
    }
}

/// Raw block device (eMMC)
pub trait BlockStorage {
    /// Whether a session is already open, e.g. left behind by a previous bootloader
    fn is_active(&self) -> bool;
    fn init(&mut self) -> io::Result<()>;
    fn set_partition(&mut self, partition: Partition) -> io::Result<()>;
    /// Reads `count` blocks starting at block `start` into `buf`
    fn read_blocks(&mut self, start: u32, count: u32, buf: &mut [u8]) -> io::Result<()>;
    fn end(&mut self);
}

/// Error raised by a cipher engine itself, as opposed to a wrong key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherFault(pub &'static str);

/// AES engine with numbered key slots
pub trait CipherEngine {
    fn set_iv(&mut self, slot: u8, iv: &[u8; 0x10]);
    /// CBC-decrypts `data` in place with the key in `slot` and its current IV
    fn decrypt_cbc(&mut self, slot: u8, data: &mut [u8]) -> Result<(), CipherFault>;
}

/// Fuse block and hardware identification registers
pub trait FuseRegisters {
    fn read_odm(&self, index: u32) -> u32;
    fn dram_id(&self) -> u32;
}

/// Source of large scratch buffers
///
/// Every buffer handed out for the container comes back through [`release`](Self::release)
/// exactly once.
pub trait BufferAllocator {
    /// Returns a zeroed buffer of exactly `len` bytes, or `None` when memory is exhausted
    fn allocate(&self, len: usize) -> Option<Vec<u8>>;
    fn release(&self, buf: Vec<u8>);
}

impl<T: BlockStorage + ?Sized> BlockStorage for &mut T {
    fn is_active(&self) -> bool { (**self).is_active() }
    fn init(&mut self) -> io::Result<()> { (**self).init() }
    fn set_partition(&mut self, partition: Partition) -> io::Result<()> { (**self).set_partition(partition) }
    fn read_blocks(&mut self, start: u32, count: u32, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_blocks(start, count, buf)
    }
    fn end(&mut self) { (**self).end() }
}

impl<T: CipherEngine + ?Sized> CipherEngine for &mut T {
    fn set_iv(&mut self, slot: u8, iv: &[u8; 0x10]) { (**self).set_iv(slot, iv) }
    fn decrypt_cbc(&mut self, slot: u8, data: &mut [u8]) -> Result<(), CipherFault> {
        (**self).decrypt_cbc(slot, data)
    }
}

impl<T: FuseRegisters + ?Sized> FuseRegisters for &T {
    fn read_odm(&self, index: u32) -> u32 { (**self).read_odm(index) }
    fn dram_id(&self) -> u32 { (**self).dram_id() }
}

impl<T: BufferAllocator + ?Sized> BufferAllocator for &T {
    fn allocate(&self, len: usize) -> Option<Vec<u8>> { (**self).allocate(len) }
    fn release(&self, buf: Vec<u8>) { (**self).release(buf) }
}

/// Plain heap allocation that reports exhaustion instead of aborting
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapAllocator;

impl BufferAllocator for HeapAllocator {
    fn allocate(&self, len: usize) -> Option<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len).ok()?;
        buf.resize(len, 0);
        Some(buf)
    }
    fn release(&self, buf: Vec<u8>) {
        drop(buf);
    }
}

/// Open storage session, ended when dropped
pub struct StorageSession<'a, S: BlockStorage + ?Sized> {
    storage: &'a mut S,
}

impl<'a, S: BlockStorage + ?Sized> StorageSession<'a, S> {
    /// Ends any stale session and initializes the device
    ///
    /// On failure nothing is left to end, so no session is returned.
    pub fn begin(storage: &'a mut S) -> io::Result<Self> {
        if storage.is_active() {
            debug!("Ending stale storage session");
            storage.end();
        }
        storage.init()?;
        Ok(Self { storage })
    }
    pub fn set_partition(&mut self, partition: Partition) -> io::Result<()> {
        self.storage.set_partition(partition)
    }
    pub fn read_blocks(&mut self, start: u32, count: u32, buf: &mut [u8]) -> io::Result<()> {
        self.storage.read_blocks(start, count, buf)
    }
}

impl<S: BlockStorage + ?Sized> Drop for StorageSession<'_, S> {
    fn drop(&mut self) {
        self.storage.end();
    }
}
