use std::fmt;

use sha2::{Digest, Sha256};

/// SHA-256 of an extracted warmboot blob, displayed as lowercase hex
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ImageDigest([u8; 0x20]);

impl ImageDigest {
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }
    #[must_use]
    pub fn bytes(&self) -> &[u8; 0x20] {
        &self.0
    }
}

impl fmt::Display for ImageDigest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ImageDigest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ImageDigest({self})")
    }
}
