//! Mariko Package1: the encrypted boot container in BOOT0
//!
//! ```text
//! [0x000 .. 0x170]  unencrypted prefix
//! [0x170 .. 0x190]  Package1 header (plaintext, doubles as the key check)
//!                     +0x10 build date, +0x10 also the CBC IV, +0x1F version byte
//! [0x190 .. end  ]  AES-128-CBC ciphertext, starting with a copy of the header
//! ```
//! Offsets past the prefix are relative to the Mariko Package1, which is also what the
//! decrypted view returned by [`ContainerImage::decrypted`] starts at.

use std::mem;

use derivative::Derivative;
use log::{debug, warn};
use static_assertions::assert_eq_size;

use crate::layout::Layout;
use crate::platform::{BufferAllocator, CipherEngine};
use crate::string::SizedCString;
use crate::{Result, WarmbootError};

#[derive(Derivative, Clone)]
#[derivative(Debug)]
#[repr(C)]
pub struct Package1Header {
    #[derivative(Debug = "ignore")]
    _unknown: [u8; 0x10],
    build_date: SizedCString<8>,
    #[derivative(Debug = "ignore")]
    _reserved: [u8; 7],
    version: u8,
}
assert_eq_size!([u8; 0x20], Package1Header);

impl Package1Header {
    /// Reinterprets the start of `bytes` as a header
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        if bytes.len() < mem::size_of::<Self>() {
            return Err(WarmbootError::ContainerTruncated { offset: bytes.len() });
        }
        // every field is a byte array, so any pointer is suitably aligned
        Ok(unsafe { &*bytes.as_ptr().cast::<Self>() })
    }
    #[must_use]
    pub fn build_date(&self) -> &SizedCString<8> {
        &self.build_date
    }
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }
}

/// The Package1 read window, owned for the whole extraction
///
/// The buffer goes back to its allocator when this is dropped, whichever way the extraction
/// ends.
pub struct ContainerImage<'a, A: BufferAllocator + ?Sized> {
    buf: Option<Vec<u8>>,
    allocator: &'a A,
    header_size: usize,
    verified: bool,
}

impl<'a, A: BufferAllocator + ?Sized> ContainerImage<'a, A> {
    pub fn allocate(allocator: &'a A, len: usize, header_size: usize) -> Result<Self> {
        let buf = allocator
            .allocate(len)
            .ok_or(WarmbootError::BufferAllocationFailure(len))?;
        Ok(Self {
            buf: Some(buf),
            allocator,
            header_size,
            verified: false,
        })
    }
    fn bytes(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or_default()
    }
    /// The as-read container, for the storage layer to fill
    pub fn raw_mut(&mut self) -> &mut [u8] {
        self.verified = false;
        self.buf.as_deref_mut().unwrap_or_default()
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes().len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Decrypts the body in place and checks it against the plaintext header
    ///
    /// A mismatch means the key is wrong or the container is corrupted. Not retried.
    pub fn decrypt<C: CipherEngine + ?Sized>(&mut self, layout: &Layout, cipher: &mut C) -> Result<()> {
        self.verified = false;
        let header_size = self.header_size;
        let raw = self.buf.as_deref_mut().unwrap_or_default();

        let view_len = raw.len().saturating_sub(header_size);
        let needed = (layout.payload_offset + layout.verify_size).max(layout.iv_offset + 0x10);
        if view_len < needed {
            return Err(WarmbootError::ContainerTruncated { offset: raw.len() });
        }
        let view = &mut raw[header_size..];

        let mut iv = [0u8; 0x10];
        iv.copy_from_slice(&view[layout.iv_offset..][..0x10]);
        cipher.set_iv(layout.key_slot, &iv);
        debug!(
            "Decrypting {:#x} bytes with key slot {}",
            view.len() - layout.payload_offset,
            layout.key_slot
        );
        cipher
            .decrypt_cbc(layout.key_slot, &mut view[layout.payload_offset..])
            .map_err(|fault| WarmbootError::CipherFault(fault.0))?;

        let plain = &view[..layout.verify_size];
        let copy = &view[layout.payload_offset..][..layout.verify_size];
        if plain != copy {
            warn!("Decrypted Package1 header does not match its plaintext copy");
            return Err(WarmbootError::DecryptVerificationFailure);
        }

        self.verified = true;
        Ok(())
    }
    /// The Mariko Package1 after a successful [`decrypt`](Self::decrypt)
    #[must_use]
    pub fn decrypted(&self) -> Option<&[u8]> {
        if !self.verified {
            return None;
        }
        self.bytes().get(self.header_size..)
    }
    #[must_use]
    pub fn header(&self) -> Option<&Package1Header> {
        self.decrypted().and_then(|view| Package1Header::from_bytes(view).ok())
    }
}

impl<A: BufferAllocator + ?Sized> Drop for ContainerImage<'_, A> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.allocator.release(buf);
        }
    }
}
