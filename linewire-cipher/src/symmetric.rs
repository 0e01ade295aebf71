//! AES block-cipher modes.
//!
//! One flat [`SymmetricCipher`] over the four chaining modes instead of a
//! type per mode; the mode is data, the key size is picked from the key
//! length at call time. CBC carries PKCS#7 padding, the other three are
//! unpadded stream modes.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{AsyncStreamCipher, BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher};
use aes::{Aes128, Aes192, Aes256};
use std::fmt;
use zeroize::Zeroizing;

use crate::encode::{decode_base64, encode_base64};
use crate::error::CipherError;
use crate::keys::IV_LENGTH;
use crate::Cipher;

/// The supported block-cipher chaining modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    /// Cipher block chaining with PKCS#7 padding.
    Cbc,
    /// Cipher feedback (full-block), no padding.
    Cfb,
    /// Output feedback, no padding.
    Ofb,
    /// Big-endian counter, no padding.
    Ctr,
}

impl CipherMode {
    /// The JCA-style transformation name for this mode.
    pub fn transformation(self) -> &'static str {
        match self {
            Self::Cbc => "AES/CBC/PKCS5Padding",
            Self::Cfb => "AES/CFB/NoPadding",
            Self::Ofb => "AES/OFB/NoPadding",
            Self::Ctr => "AES/CTR/NoPadding",
        }
    }

    /// Parse a transformation name.
    ///
    /// Any string outside the four supported transformations is an
    /// [`CipherError::UnsupportedAlgorithm`] error. No fallback. No default.
    pub fn from_name(name: &str) -> Result<Self, CipherError> {
        match name {
            "AES/CBC/PKCS5Padding" => Ok(Self::Cbc),
            "AES/CFB/NoPadding" => Ok(Self::Cfb),
            "AES/OFB/NoPadding" => Ok(Self::Ofb),
            "AES/CTR/NoPadding" => Ok(Self::Ctr),
            other => Err(CipherError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for CipherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.transformation())
    }
}

/// An AES cipher context: mode, IV and secret key.
///
/// Immutable per encrypt/decrypt call; the setters exist for runtime key
/// rotation on an owning transport. Key bytes are zeroized on drop.
pub struct SymmetricCipher {
    mode: CipherMode,
    iv: [u8; IV_LENGTH],
    key: Zeroizing<Vec<u8>>,
}

impl SymmetricCipher {
    /// Build a cipher from raw IV and key bytes.
    ///
    /// # Errors
    ///
    /// Fails fast with [`CipherError::InvalidIvLength`] unless the IV is
    /// exactly 16 bytes, and [`CipherError::InvalidKeySize`] unless the key
    /// is 16, 24 or 32 bytes.
    pub fn new(mode: CipherMode, iv: &[u8], key: &[u8]) -> Result<Self, CipherError> {
        Ok(Self {
            mode,
            iv: check_iv(iv)?,
            key: check_key(key)?,
        })
    }

    /// Build a cipher from base64 IV and key text.
    pub fn from_base64(mode: CipherMode, iv: &str, key: &str) -> Result<Self, CipherError> {
        Self::new(mode, &decode_base64(iv)?, &decode_base64(key)?)
    }

    /// Current chaining mode.
    pub fn mode(&self) -> CipherMode {
        self.mode
    }

    /// Current IV.
    pub fn iv(&self) -> &[u8; IV_LENGTH] {
        &self.iv
    }

    /// Current IV as base64 text.
    pub fn base64_iv(&self) -> String {
        encode_base64(&self.iv)
    }

    /// Current secret key bytes.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Current secret key as base64 text.
    pub fn base64_key(&self) -> String {
        encode_base64(&self.key)
    }

    /// Replace the chaining mode.
    pub fn set_mode(&mut self, mode: CipherMode) {
        self.mode = mode;
    }

    /// Replace the IV.
    pub fn set_iv(&mut self, iv: &[u8]) -> Result<(), CipherError> {
        self.iv = check_iv(iv)?;
        Ok(())
    }

    /// Replace the secret key.
    pub fn set_key(&mut self, key: &[u8]) -> Result<(), CipherError> {
        self.key = check_key(key)?;
        Ok(())
    }

    /// Replace the IV from its base64 form.
    pub fn set_base64_iv(&mut self, iv: &str) -> Result<(), CipherError> {
        self.set_iv(&decode_base64(iv)?)
    }

    /// Replace the secret key from its base64 form.
    pub fn set_base64_key(&mut self, key: &str) -> Result<(), CipherError> {
        self.set_key(&decode_base64(key)?)
    }

    fn encrypt_cbc(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let out = match self.key.len() {
            16 => cbc::Encryptor::<Aes128>::new_from_slices(&self.key, &self.iv)
                .map_err(|_| CipherError::InvalidKeySize(self.key.len() * 8))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            24 => cbc::Encryptor::<Aes192>::new_from_slices(&self.key, &self.iv)
                .map_err(|_| CipherError::InvalidKeySize(self.key.len() * 8))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            _ => cbc::Encryptor::<Aes256>::new_from_slices(&self.key, &self.iv)
                .map_err(|_| CipherError::InvalidKeySize(self.key.len() * 8))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        };
        Ok(out)
    }

    fn decrypt_cbc(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let out = match self.key.len() {
            16 => cbc::Decryptor::<Aes128>::new_from_slices(&self.key, &self.iv)
                .map_err(|_| CipherError::InvalidKeySize(self.key.len() * 8))?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            24 => cbc::Decryptor::<Aes192>::new_from_slices(&self.key, &self.iv)
                .map_err(|_| CipherError::InvalidKeySize(self.key.len() * 8))?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            _ => cbc::Decryptor::<Aes256>::new_from_slices(&self.key, &self.iv)
                .map_err(|_| CipherError::InvalidKeySize(self.key.len() * 8))?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        };
        out.map_err(|_| CipherError::BadPadding)
    }

    fn encrypt_cfb(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut buf = plaintext.to_vec();
        match self.key.len() {
            16 => cfb_mode::Encryptor::<Aes128>::new_from_slices(&self.key, &self.iv)
                .map_err(|_| CipherError::InvalidKeySize(self.key.len() * 8))?
                .encrypt(&mut buf),
            24 => cfb_mode::Encryptor::<Aes192>::new_from_slices(&self.key, &self.iv)
                .map_err(|_| CipherError::InvalidKeySize(self.key.len() * 8))?
                .encrypt(&mut buf),
            _ => cfb_mode::Encryptor::<Aes256>::new_from_slices(&self.key, &self.iv)
                .map_err(|_| CipherError::InvalidKeySize(self.key.len() * 8))?
                .encrypt(&mut buf),
        }
        Ok(buf)
    }

    fn decrypt_cfb(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut buf = ciphertext.to_vec();
        match self.key.len() {
            16 => cfb_mode::Decryptor::<Aes128>::new_from_slices(&self.key, &self.iv)
                .map_err(|_| CipherError::InvalidKeySize(self.key.len() * 8))?
                .decrypt(&mut buf),
            24 => cfb_mode::Decryptor::<Aes192>::new_from_slices(&self.key, &self.iv)
                .map_err(|_| CipherError::InvalidKeySize(self.key.len() * 8))?
                .decrypt(&mut buf),
            _ => cfb_mode::Decryptor::<Aes256>::new_from_slices(&self.key, &self.iv)
                .map_err(|_| CipherError::InvalidKeySize(self.key.len() * 8))?
                .decrypt(&mut buf),
        }
        Ok(buf)
    }

    /// OFB and CTR are symmetric keystream modes: encrypt and decrypt are the
    /// same operation.
    fn apply_keystream(&self, data: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut buf = data.to_vec();
        let invalid = || CipherError::InvalidKeySize(self.key.len() * 8);
        match (self.mode, self.key.len()) {
            (CipherMode::Ofb, 16) => ofb::Ofb::<Aes128>::new_from_slices(&self.key, &self.iv)
                .map_err(|_| invalid())?
                .apply_keystream(&mut buf),
            (CipherMode::Ofb, 24) => ofb::Ofb::<Aes192>::new_from_slices(&self.key, &self.iv)
                .map_err(|_| invalid())?
                .apply_keystream(&mut buf),
            (CipherMode::Ofb, _) => ofb::Ofb::<Aes256>::new_from_slices(&self.key, &self.iv)
                .map_err(|_| invalid())?
                .apply_keystream(&mut buf),
            (_, 16) => ctr::Ctr128BE::<Aes128>::new_from_slices(&self.key, &self.iv)
                .map_err(|_| invalid())?
                .apply_keystream(&mut buf),
            (_, 24) => ctr::Ctr128BE::<Aes192>::new_from_slices(&self.key, &self.iv)
                .map_err(|_| invalid())?
                .apply_keystream(&mut buf),
            (_, _) => ctr::Ctr128BE::<Aes256>::new_from_slices(&self.key, &self.iv)
                .map_err(|_| invalid())?
                .apply_keystream(&mut buf),
        }
        Ok(buf)
    }
}

impl Cipher for SymmetricCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        match self.mode {
            CipherMode::Cbc => self.encrypt_cbc(plaintext),
            CipherMode::Cfb => self.encrypt_cfb(plaintext),
            CipherMode::Ofb | CipherMode::Ctr => self.apply_keystream(plaintext),
        }
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        match self.mode {
            CipherMode::Cbc => self.decrypt_cbc(ciphertext),
            CipherMode::Cfb => self.decrypt_cfb(ciphertext),
            CipherMode::Ofb | CipherMode::Ctr => self.apply_keystream(ciphertext),
        }
    }
}

impl fmt::Debug for SymmetricCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material deliberately omitted.
        f.debug_struct("SymmetricCipher")
            .field("mode", &self.mode)
            .field("key_bits", &(self.key.len() * 8))
            .finish()
    }
}

fn check_iv(iv: &[u8]) -> Result<[u8; IV_LENGTH], CipherError> {
    if iv.len() != IV_LENGTH {
        return Err(CipherError::InvalidIvLength(iv.len()));
    }
    let mut out = [0u8; IV_LENGTH];
    out.copy_from_slice(iv);
    Ok(out)
}

fn check_key(key: &[u8]) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    match key.len() {
        16 | 24 | 32 => Ok(Zeroizing::new(key.to_vec())),
        other => Err(CipherError::InvalidKeySize(other * 8)),
    }
}
