use std::collections::HashMap;
use std::fmt;

use log::debug;

use crate::layout::KS_MARIKO_BEK;
use crate::platform::{CipherEngine, CipherFault};
use crate::{Result, WarmbootError};

pub mod aes128_cbc {
    pub use aes::cipher::block_padding::NoPadding;
    pub use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
    pub type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
    pub type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
}

use aes128_cbc::*;

/// Keys read from a `prod.keys` style file
#[derive(Clone, Debug, Default)]
pub struct KeyBag {
    keys: HashMap<KeyIndex, [u8; 0x10]>,
}

impl KeyBag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    /// Parses `name = hex` lines, ignoring keys this crate has no use for
    pub fn from_string(text: &str) -> Result<Self> {
        let mut bag = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(['#', ';']) {
                continue;
            }
            let Some((name, value)) = line.split_once('=') else {
                continue;
            };
            let Some(idx) = KeyIndex::from_name(name.trim()) else {
                continue;
            };

            let bytes = hex::decode(value.trim())?;
            let key: [u8; 0x10] = bytes.as_slice().try_into().map_err(|_| WarmbootError::InvalidLength {
                what: "key",
                actual: bytes.len(),
                expected: 0x10,
            })?;
            bag.set_key(idx, key);
        }
        Ok(bag)
    }
    pub fn set_key(&mut self, idx: KeyIndex, key: [u8; 0x10]) {
        self.keys.insert(idx, key);
    }
    pub fn get_key(&self, idx: KeyIndex) -> Result<&[u8; 0x10]> {
        self.keys.get(&idx).ok_or(WarmbootError::MissingKey(idx))
    }
}

#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq)]
pub enum KeyIndex {
    MarikoBek,
    MarikoKek,
}

impl KeyIndex {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "mariko_bek" => Some(Self::MarikoBek),
            "mariko_kek" => Some(Self::MarikoKek),
            _ => None,
        }
    }
}

impl fmt::Display for KeyIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::MarikoBek => "mariko_bek",
            Self::MarikoKek => "mariko_kek",
        })
    }
}

/// Security engine stand-in backed by the `aes` crate
///
/// Like the hardware, a slot's IV advances to the last ciphertext block after each
/// decryption, so consecutive calls continue one CBC stream.
#[derive(Clone, Default)]
pub struct SoftwareCipher {
    keys: HashMap<u8, [u8; 0x10]>,
    ivs: HashMap<u8, [u8; 0x10]>,
}

impl SoftwareCipher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    /// Loads the Mariko BEK into its key slot
    pub fn from_keybag(bag: &KeyBag) -> Result<Self> {
        let mut me = Self::new();
        me.set_key(KS_MARIKO_BEK, *bag.get_key(KeyIndex::MarikoBek)?);
        Ok(me)
    }
    pub fn set_key(&mut self, slot: u8, key: [u8; 0x10]) {
        self.keys.insert(slot, key);
    }
}

impl fmt::Debug for SoftwareCipher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut slots: Vec<_> = self.keys.keys().collect();
        slots.sort();
        f.debug_struct("SoftwareCipher")
            .field("slots", &slots)
            .finish()
    }
}

impl CipherEngine for SoftwareCipher {
    fn set_iv(&mut self, slot: u8, iv: &[u8; 0x10]) {
        self.ivs.insert(slot, *iv);
    }
    fn decrypt_cbc(&mut self, slot: u8, data: &mut [u8]) -> std::result::Result<(), CipherFault> {
        let key = self.keys.get(&slot).ok_or(CipherFault("key slot is empty"))?;
        if data.len() % 0x10 != 0 {
            return Err(CipherFault("length is not a multiple of the block size"));
        }
        if data.is_empty() {
            return Ok(());
        }

        let iv = self.ivs.get(&slot).copied().unwrap_or_default();
        let mut next_iv = [0u8; 0x10];
        next_iv.copy_from_slice(&data[data.len() - 0x10..]);

        debug!("AES-CBC decrypt of {:#x} bytes in slot {slot}", data.len());
        Aes128CbcDec::new(key.into(), &iv.into())
            .decrypt_padded_mut::<NoPadding>(data)
            .map_err(|_| CipherFault("unpadding failed"))?;
        self.ivs.insert(slot, next_iv);
        Ok(())
    }
}
