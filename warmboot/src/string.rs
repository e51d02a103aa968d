use std::{borrow::Cow, fmt, str};

/// Fixed-width text field inside a raw header, e.g. the Package1 build date or the PK11 magic
///
/// Fields are NUL padded when shorter than their width; the padding is not part of the text.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct SizedCString<const SIZE: usize>([u8; SIZE]);

impl<const SIZE: usize> SizedCString<SIZE> {
    /// Text up to the first NUL
    fn text(&self) -> &[u8] {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(SIZE);
        &self.0[..end]
    }
    pub fn as_str(&self) -> Result<&str, str::Utf8Error> {
        str::from_utf8(self.text())
    }
    #[must_use]
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.text())
    }
    /// The whole field, padding included
    #[must_use]
    pub fn data(&self) -> &[u8; SIZE] {
        &self.0
    }
}

impl<const SIZE: usize> Default for SizedCString<SIZE> {
    fn default() -> Self {
        Self([0; SIZE])
    }
}

impl<const SIZE: usize> fmt::Debug for SizedCString<SIZE> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

impl<const SIZE: usize> fmt::Display for SizedCString<SIZE> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}
