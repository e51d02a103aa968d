//! Shared fixtures: synthetic Package1 containers and instrumented collaborators.

#![allow(dead_code)]

use std::cell::Cell;
use std::io;

use hex_literal::hex;
use warmboot::crypto::aes128_cbc::*;
use warmboot::layout::Layout;
use warmboot::pk11::{PK11_MAGIC, SIG_NX_BOOTLOADER};
use warmboot::platform::{BlockStorage, BufferAllocator, CipherEngine, CipherFault, Partition};
use warmboot::prelude::*;

pub const TEST_BEK: [u8; 0x10] = hex!("7f5bd7a0c3b61e2f80d44fa1b3c29e05");
pub const WRONG_BEK: [u8; 0x10] = hex!("00112233445566778899aabbccddeeff");

/// 13.0.0, PK11 at 0x7000
pub const DATE_13_0_0: &[u8; 8] = b"20210805";
/// 5.0.0, PK11 at 0x4000
pub const VERSION_5_0_0: u8 = 0x0B;

/// Deterministic filler for warmboot bodies
pub fn payload_byte(i: usize) -> u8 {
    (i as u8).wrapping_mul(31).wrapping_add(7)
}

/// What a packaged warmboot of `size` bytes should look like
pub fn expected_blob(size: u32) -> Vec<u8> {
    let mut out = size.to_le_bytes().to_vec();
    out.extend((0..size as usize - 4).map(payload_byte));
    out
}

/// Builds the decrypted view of a Mariko Package1 and the BOOT0 image around it
#[derive(Clone)]
pub struct Package1Builder {
    layout: Layout,
    version: u8,
    date: [u8; 8],
    pk11_offset: Option<usize>,
    body_base: usize,
    header_words: [u32; 8],
    writes: Vec<(usize, Vec<u8>)>,
}

impl Package1Builder {
    pub fn new() -> Self {
        Self {
            layout: Layout::default(),
            version: 0x10,
            date: *DATE_13_0_0,
            pk11_offset: Some(0x7000),
            body_base: 0x7020,
            header_words: [0; 8],
            writes: Vec::new(),
        }
    }
    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }
    pub fn firmware(mut self, version: u8, date: &[u8; 8]) -> Self {
        self.version = version;
        self.date = *date;
        self
    }
    /// Moves the PK11 header; `None` leaves the magic out entirely
    pub fn pk11_at(mut self, offset: Option<usize>) -> Self {
        self.pk11_offset = offset;
        self.body_base = offset.unwrap_or(0x7000) + 0x20;
        self
    }
    pub fn header_word(mut self, slot: usize, value: u32) -> Self {
        self.header_words[slot] = value;
        self
    }
    /// Writes a word at an offset relative to the end of the PK11 header
    pub fn word_at(mut self, body_offset: usize, value: u32) -> Self {
        self.writes.push((self.body_base + body_offset, value.to_le_bytes().to_vec()));
        self
    }
    /// Places a warmboot blob of `size` bytes relative to the end of the PK11 header
    pub fn warmboot_at(mut self, body_offset: usize, size: u32) -> Self {
        self.writes.push((self.body_base + body_offset, expected_blob(size.max(4))));
        if size < 4 {
            // the size word itself still has to read back as `size`
            self.writes.push((self.body_base + body_offset, size.to_le_bytes().to_vec()));
        }
        self
    }
    /// The standard round trip container: one NX bootloader of 0x100 bytes, then the warmboot
    pub fn standard(size: u32) -> Self {
        Self::new()
            .header_word(6, 0x100)
            .word_at(0, SIG_NX_BOOTLOADER)
            .warmboot_at(0x100, size)
    }

    pub fn view(&self) -> Vec<u8> {
        let layout = &self.layout;
        let mut view = vec![0u8; layout.read_size() - layout.header_size];

        view[0x10..0x18].copy_from_slice(&self.date);
        view[0x1F] = self.version;
        let header: Vec<u8> = view[..layout.verify_size].to_vec();
        view[layout.payload_offset..][..layout.verify_size].copy_from_slice(&header);

        if let Some(offset) = self.pk11_offset {
            view[offset..offset + 4].copy_from_slice(PK11_MAGIC);
            for slot in 1..8 {
                let at = offset + slot * 4;
                view[at..at + 4].copy_from_slice(&self.header_words[slot].to_le_bytes());
            }
        }
        for (offset, bytes) in &self.writes {
            let end = (offset + bytes.len()).min(view.len());
            view[*offset..end].copy_from_slice(&bytes[..end - offset]);
        }
        view
    }
    fn boot0_around(&self, view: &[u8]) -> Vec<u8> {
        let layout = &self.layout;
        let start = layout.package1_offset as usize;
        let mut boot0 = vec![0u8; start + layout.read_size()];
        boot0[start..start + layout.header_size].fill(0x5A);
        boot0[start + layout.header_size..].copy_from_slice(view);
        boot0
    }
    /// BOOT0 with the container left in plaintext, for use with [`IdentityCipher`]
    pub fn plain_boot0(&self) -> Vec<u8> {
        self.boot0_around(&self.view())
    }
    /// BOOT0 with the container encrypted the way the console stores it
    pub fn encrypted_boot0(&self, key: &[u8; 0x10]) -> Vec<u8> {
        let layout = &self.layout;
        let mut view = self.view();
        let mut iv = [0u8; 0x10];
        iv.copy_from_slice(&view[layout.iv_offset..][..0x10]);

        let body = &mut view[layout.payload_offset..];
        let len = body.len();
        Aes128CbcEnc::new(key.into(), &iv.into())
            .encrypt_padded_mut::<NoPadding>(body, len)
            .unwrap();
        self.boot0_around(&view)
    }
}

/// Storage that can be told to fail at each step
#[derive(Debug, Default)]
pub struct MockStorage {
    inner: ImageStorage,
    pub stale: bool,
    pub fail_init: bool,
    pub fail_partition: bool,
    pub fail_read: bool,
    pub init_calls: usize,
    pub end_calls: usize,
    pub partition: Option<Partition>,
}

impl MockStorage {
    pub fn with_boot0(data: Vec<u8>) -> Self {
        Self {
            inner: ImageStorage::new().with_partition(Partition::Boot0, data),
            ..Self::default()
        }
    }
}

impl BlockStorage for MockStorage {
    fn is_active(&self) -> bool {
        self.stale || self.inner.is_active()
    }
    fn init(&mut self) -> io::Result<()> {
        self.init_calls += 1;
        if self.fail_init {
            return Err(io::Error::new(io::ErrorKind::Other, "controller did not respond"));
        }
        self.inner.init()
    }
    fn set_partition(&mut self, partition: Partition) -> io::Result<()> {
        if self.fail_partition {
            return Err(io::Error::new(io::ErrorKind::Other, "switch command timed out"));
        }
        self.partition = Some(partition);
        self.inner.set_partition(partition)
    }
    fn read_blocks(&mut self, start: u32, count: u32, buf: &mut [u8]) -> io::Result<()> {
        if self.fail_read {
            return Err(io::Error::new(io::ErrorKind::Other, "CRC error"));
        }
        self.inner.read_blocks(start, count, buf)
    }
    fn end(&mut self) {
        self.end_calls += 1;
        self.stale = false;
        self.inner.end();
    }
}

/// Cipher that leaves data untouched, for plaintext containers
#[derive(Debug, Default)]
pub struct IdentityCipher {
    pub corrupt: bool,
    pub fault: bool,
    pub calls: usize,
    pub last_slot: Option<u8>,
    pub last_iv: Option<[u8; 0x10]>,
}

impl CipherEngine for IdentityCipher {
    fn set_iv(&mut self, _slot: u8, iv: &[u8; 0x10]) {
        self.last_iv = Some(*iv);
    }
    fn decrypt_cbc(&mut self, slot: u8, data: &mut [u8]) -> Result<(), CipherFault> {
        self.calls += 1;
        self.last_slot = Some(slot);
        if self.fault {
            return Err(CipherFault("engine busy"));
        }
        if self.corrupt {
            data[0] ^= 0xFF;
        }
        Ok(())
    }
}

/// Allocator that tracks outstanding buffers and can fail the n-th request
#[derive(Debug, Default)]
pub struct CountingAllocator {
    pub live: Cell<isize>,
    pub allocations: Cell<usize>,
    pub releases: Cell<usize>,
    /// 1-based index of the allocation to refuse
    pub fail_on: Option<usize>,
}

impl CountingAllocator {
    pub fn failing_on(n: usize) -> Self {
        Self {
            fail_on: Some(n),
            ..Self::default()
        }
    }
}

impl BufferAllocator for CountingAllocator {
    fn allocate(&self, len: usize) -> Option<Vec<u8>> {
        let n = self.allocations.get() + 1;
        self.allocations.set(n);
        if self.fail_on == Some(n) {
            return None;
        }
        self.live.set(self.live.get() + 1);
        Some(vec![0; len])
    }
    fn release(&self, buf: Vec<u8>) {
        drop(buf);
        self.releases.set(self.releases.get() + 1);
        self.live.set(self.live.get() - 1);
    }
}

/// Mariko fuses with `count` anti-downgrade bits set
pub fn mariko_fuses(count: u32) -> StaticFuses {
    let low = count.min(32);
    let high = count.saturating_sub(32).min(32);
    let mask = |n: u32| if n == 32 { u32::MAX } else { (1u32 << n) - 1 };
    StaticFuses::new(mask(low), mask(high), 8)
}

pub fn erista_fuses(count: u32) -> StaticFuses {
    StaticFuses { dram_id: 1, ..mariko_fuses(count) }
}
