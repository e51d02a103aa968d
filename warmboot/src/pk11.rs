//! PK11, the container inside the decrypted Package1
//!
//! After the 0x20 byte header come up to three sub-images in firmware-dependent order: the NX
//! bootloader, the secure monitor and the warmboot firmware. The first two start with a known
//! instruction word, the warmboot starts with its own size.

use std::fmt;
use std::mem;
use std::ptr;

use log::{debug, warn};
use redox_simple_endian::*;
use static_assertions::assert_eq_size;

use crate::string::SizedCString;
use crate::{Result, WarmbootError};

pub const PK11_MAGIC: &[u8; 4] = b"PK11";

/// Maximum number of sub-image signatures inspected before giving up on skipping
pub const MAX_SIGNATURE_READS: usize = 3;

pub const SIG_NX_BOOTLOADER: u32 = 0xD503_4FDF;
pub const SIG_SECURE_MONITOR_1: u32 = 0xE328_F0C0;
pub const SIG_SECURE_MONITOR_2: u32 = 0xF0C0_A7F0;

#[derive(Clone)]
#[repr(C)]
pub struct Pk11Header {
    magic: SizedCString<4>,
    warmboot_size: u32le,
    warmboot_offset: u32le,
    _reserved: u32le,
    secmon_size: u32le,
    secmon_offset: u32le,
    bootloader_size: u32le,
    bootloader_offset: u32le,
}
assert_eq_size!([u8; 0x20], Pk11Header);

impl Pk11Header {
    /// Copies a header out of `bytes`, which need not be aligned
    pub fn read(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < mem::size_of::<Self>() {
            return Err(WarmbootError::ContainerTruncated { offset: bytes.len() });
        }
        Ok(unsafe { ptr::read_unaligned(bytes.as_ptr().cast::<Self>()) })
    }
    #[must_use]
    pub fn magic_ok(&self) -> bool {
        self.magic.data() == PK11_MAGIC
    }
    #[must_use]
    pub fn warmboot_size(&self) -> u32 { self.warmboot_size.to_native() }
    #[must_use]
    pub fn secmon_size(&self) -> u32 { self.secmon_size.to_native() }
    #[must_use]
    pub fn bootloader_size(&self) -> u32 { self.bootloader_size.to_native() }
    /// The header as eight native-endian words
    #[must_use]
    pub fn words(&self) -> [u32; 8] {
        [
            u32::from_le_bytes(*self.magic.data()),
            self.warmboot_size.to_native(),
            self.warmboot_offset.to_native(),
            self._reserved.to_native(),
            self.secmon_size.to_native(),
            self.secmon_offset.to_native(),
            self.bootloader_size.to_native(),
            self.bootloader_offset.to_native(),
        ]
    }
    /// Word `slot` of the header, zero when out of range
    #[must_use]
    pub fn word(&self, slot: usize) -> u32 {
        self.words().get(slot).copied().unwrap_or(0)
    }
}

impl fmt::Debug for Pk11Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Pk11Header")
            .field("magic", &self.magic)
            .field("warmboot_size", &self.warmboot_size())
            .field("warmboot_offset", &self.warmboot_offset.to_native())
            .field("secmon_size", &self.secmon_size())
            .field("secmon_offset", &self.secmon_offset.to_native())
            .field("bootloader_size", &self.bootloader_size())
            .field("bootloader_offset", &self.bootloader_offset.to_native())
            .finish()
    }
}

/// What a sub-image's first word says about it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    NxBootloader,
    SecureMonitor,
    Unrecognized(u32),
}

impl Signature {
    #[must_use]
    pub fn classify(raw: u32) -> Self {
        match raw {
            SIG_NX_BOOTLOADER => Self::NxBootloader,
            SIG_SECURE_MONITOR_1 | SIG_SECURE_MONITOR_2 => Self::SecureMonitor,
            other => Self::Unrecognized(other),
        }
    }
    /// Header word holding the size to skip over this sub-image, `None` if it isn't skippable
    #[must_use]
    pub fn skip_slot(self) -> Option<usize> {
        match self {
            Self::NxBootloader => Some(6),
            Self::SecureMonitor => Some(4),
            Self::Unrecognized(_) => None,
        }
    }
}

pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    let word = offset
        .checked_add(4)
        .and_then(|end| bytes.get(offset..end))
        .ok_or(WarmbootError::ContainerTruncated { offset })?;
    Ok(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
}

/// Returns the first candidate offset holding the PK11 magic
pub fn locate(view: &[u8], candidates: &[usize]) -> Option<usize> {
    let found = candidates
        .iter()
        .copied()
        .find(|&offset| view.get(offset..).and_then(|b| b.get(..4)) == Some(PK11_MAGIC.as_slice()));
    match found {
        Some(offset) if Some(&offset) != candidates.first() => {
            warn!("PK11 found at {offset:#x}, not at the hinted offset");
        },
        Some(offset) => debug!("PK11 found at {offset:#x}"),
        None => debug!("PK11 magic missing at {candidates:#x?}"),
    }
    found
}

/// Walks past the leading sub-images to the warmboot image
#[derive(Debug)]
pub struct Navigator<'a> {
    view: &'a [u8],
    pk11_offset: usize,
    header: Pk11Header,
    cursor: usize,
    iteration: usize,
    signatures: [u32; MAX_SIGNATURE_READS],
}

impl<'a> Navigator<'a> {
    /// Starts right after the PK11 header at `pk11_offset`
    pub fn new(view: &'a [u8], pk11_offset: usize) -> Result<Self> {
        let header = Pk11Header::read(view.get(pk11_offset..).unwrap_or_default())
            .map_err(|_| WarmbootError::ContainerTruncated { offset: pk11_offset })?;
        Ok(Self {
            view,
            pk11_offset,
            header,
            cursor: pk11_offset + mem::size_of::<Pk11Header>(),
            iteration: 0,
            signatures: [0; MAX_SIGNATURE_READS],
        })
    }
    /// Runs the walk and returns the warmboot offset within the view
    ///
    /// Skips a recognized sub-image by the size in its header slot, stops at the first
    /// unrecognized signature, and never reads more than three signatures.
    pub fn run(&mut self) -> Result<usize> {
        while self.iteration < MAX_SIGNATURE_READS {
            let raw = read_u32(self.view, self.cursor)?;
            self.signatures[self.iteration] = raw;
            self.iteration += 1;

            let sig = Signature::classify(raw);
            let Some(slot) = sig.skip_slot() else {
                debug!("Unrecognized signature {raw:#010x} at {:#x}, taking it as warmboot", self.cursor);
                break;
            };
            // skips are counted in whole words
            let skip = (self.header.word(slot) & !3) as usize;
            debug!("Skipping {sig:?} ({skip:#x} bytes) at {:#x}", self.cursor);
            self.cursor = self
                .cursor
                .checked_add(skip)
                .ok_or(WarmbootError::ContainerTruncated { offset: self.cursor })?;
        }
        Ok(self.cursor)
    }
    #[must_use]
    pub fn header(&self) -> &Pk11Header {
        &self.header
    }
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }
    /// Cursor position relative to the PK11 header
    #[must_use]
    pub fn relative_cursor(&self) -> usize {
        self.cursor - self.pk11_offset
    }
    /// Number of signatures read so far
    #[must_use]
    pub fn reads(&self) -> usize {
        self.iteration
    }
    /// Signatures in read order, zero where nothing was read
    #[must_use]
    pub fn signatures(&self) -> [u32; MAX_SIGNATURE_READS] {
        self.signatures
    }
}
