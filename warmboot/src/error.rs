use std::io;

use thiserror::Error;

#[cfg(feature = "crypto")]
use crate::crypto;

/// Catch-all error type for the warmboot library
///
/// The first twelve variants are the outcomes of [`crate::Extractor::extract`], each with a
/// stable [`code`](WarmbootError::code). None of them are retried internally.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WarmbootError {
    #[error("no container window to read from")]
    NullArgument,
    #[error("unsupported hardware family")]
    UnsupportedHardwareFamily,
    #[error("failed to allocate container buffer ({0:#x} bytes)")]
    BufferAllocationFailure(usize),
    #[error("failed to initialize storage")]
    StorageInitFailure(#[source] io::Error),
    #[error("failed to select storage partition")]
    StoragePartitionSelectFailure(#[source] io::Error),
    #[error("failed to read container from storage")]
    StorageReadFailure(#[source] io::Error),
    #[error("decrypted container failed verification")]
    DecryptVerificationFailure,
    #[error("PK11 magic not found")]
    ContainerMagicNotFound,
    #[error("warmboot size {size:#x} out of range")]
    ImageSizeOutOfRange { size: u32 },
    #[error("failed to allocate warmboot buffer ({0:#x} bytes)")]
    OutputAllocationFailure(usize),
    #[error("cipher engine fault: {0}")]
    CipherFault(&'static str),
    #[error("container truncated at offset {offset:#x}")]
    ContainerTruncated { offset: usize },

    #[cfg(feature = "crypto")]
    #[error("Missing {0} key")]
    MissingKey(crypto::KeyIndex),
    #[error("Invalid length of {what}: {actual} (expected {expected})")]
    InvalidLength {
        what: &'static str,
        actual: usize,
        expected: usize,
    },
    #[error("Failed to decode hex string")]
    HexError(#[from] hex::FromHexError),
    #[error("I/O error")]
    Io(#[from] io::Error),
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
}

impl WarmbootError {
    /// Stable numeric code, distinct for every failure cause
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            Self::NullArgument => 1,
            Self::UnsupportedHardwareFamily => 2,
            Self::BufferAllocationFailure(_) => 3,
            Self::StorageInitFailure(_) => 4,
            Self::StoragePartitionSelectFailure(_) => 5,
            Self::StorageReadFailure(_) => 6,
            Self::DecryptVerificationFailure => 7,
            Self::ContainerMagicNotFound => 8,
            Self::ImageSizeOutOfRange { .. } => 9,
            Self::OutputAllocationFailure(_) => 10,
            Self::CipherFault(_) => 11,
            Self::ContainerTruncated { .. } => 12,
            #[cfg(feature = "crypto")]
            Self::MissingKey(_) => 0x20,
            Self::InvalidLength { .. } => 0x21,
            Self::HexError(_) => 0x22,
            Self::Io(_) => 0x30,
            Self::ShortWrite { .. } => 0x31,
        }
    }

    /// Human readable explanation meant for the end user
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::NullArgument => "Nothing to extract from (empty Package1 window)",
            Self::UnsupportedHardwareFamily => "Erista not supported (uses embedded warmboot)",
            Self::BufferAllocationFailure(_) => "Failed to allocate Package1 buffer",
            Self::StorageInitFailure(_) => "Failed to initialize eMMC",
            Self::StoragePartitionSelectFailure(_) => "Failed to set BOOT0 partition",
            Self::StorageReadFailure(_) => "Failed to read Package1 from BOOT0",
            Self::DecryptVerificationFailure => "Package1 decryption failed (BEK missing or wrong)",
            Self::ContainerMagicNotFound => "PK11 magic not found (invalid Package1)",
            Self::ImageSizeOutOfRange { .. } => "Warmboot size invalid (not 0x800-0x1000)",
            Self::OutputAllocationFailure(_) => "Failed to allocate warmboot buffer",
            Self::CipherFault(_) => "Security engine rejected the decryption request",
            Self::ContainerTruncated { .. } => "Package1 ends before the warmboot image",
            #[cfg(feature = "crypto")]
            Self::MissingKey(_) => "Required key missing from key file",
            Self::InvalidLength { .. } => "Key has the wrong length",
            Self::HexError(_) => "Key file contains invalid hex",
            Self::Io(_) => "Filesystem error",
            Self::ShortWrite { .. } => "Warmboot file written incompletely",
        }
    }
}
