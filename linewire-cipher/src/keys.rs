//! Key and IV factories.
//!
//! Every factory exists in a byte form and a base64-text form so a cipher can
//! be parameterized either programmatically or from configuration text. The
//! hex-source factories implement the CFB convention: fixed-length uppercase
//! or lowercase hex strings, validated character by character before decoding.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::encode::{encode_base64, hex_to_bytes};
use crate::error::CipherError;

/// AES block and IV length in bytes.
pub const IV_LENGTH: usize = 16;

/// Required length of a hex IV source string (32 hex chars = 16 bytes).
pub const IV_SOURCE_LENGTH: usize = 32;

/// Required length of a hex key source string (64 hex chars = 32 bytes).
pub const KEY_SOURCE_LENGTH: usize = 64;

/// The three key sizes AES accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySize {
    /// 128-bit key (16 bytes).
    Bits128,
    /// 192-bit key (24 bytes).
    Bits192,
    /// 256-bit key (32 bytes).
    Bits256,
}

impl KeySize {
    /// Map a bit count to a key size.
    ///
    /// Anything other than 128, 192 or 256 fails with
    /// [`CipherError::InvalidKeySize`].
    pub fn from_bits(bits: usize) -> Result<Self, CipherError> {
        match bits {
            128 => Ok(Self::Bits128),
            192 => Ok(Self::Bits192),
            256 => Ok(Self::Bits256),
            other => Err(CipherError::InvalidKeySize(other)),
        }
    }

    /// Key size in bits.
    pub fn bits(self) -> usize {
        match self {
            Self::Bits128 => 128,
            Self::Bits192 => 192,
            Self::Bits256 => 256,
        }
    }

    /// Key size in bytes.
    pub fn byte_len(self) -> usize {
        self.bits() / 8
    }
}

/// Generate a random 16-byte IV.
pub fn generate_iv() -> [u8; IV_LENGTH] {
    let mut iv = [0u8; IV_LENGTH];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Generate a random IV as base64 text.
pub fn generate_base64_iv() -> String {
    encode_base64(&generate_iv())
}

/// Generate a random secret key of the given size.
pub fn generate_key(size: KeySize) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(vec![0u8; size.byte_len()]);
    OsRng.fill_bytes(&mut key);
    key
}

/// Generate a random secret key as base64 text.
pub fn generate_base64_key(size: KeySize) -> String {
    encode_base64(&generate_key(size))
}

/// Derive a 16-byte IV from a 32-character hex source string.
pub fn iv_from_hex_source(source: &str) -> Result<[u8; IV_LENGTH], CipherError> {
    check_hex_source(source, IV_SOURCE_LENGTH)?;
    let bytes = hex_to_bytes(source)?;
    let mut iv = [0u8; IV_LENGTH];
    iv.copy_from_slice(&bytes);
    Ok(iv)
}

/// Derive a 32-byte secret key from a 64-character hex source string.
pub fn key_from_hex_source(source: &str) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    check_hex_source(source, KEY_SOURCE_LENGTH)?;
    Ok(Zeroizing::new(hex_to_bytes(source)?))
}

/// Validate a hex source string: exact length, hex alphabet only.
fn check_hex_source(source: &str, expected: usize) -> Result<(), CipherError> {
    let actual = source.chars().count();
    if actual != expected {
        return Err(CipherError::HexSourceLength { expected, actual });
    }
    for c in source.chars() {
        if !c.is_ascii_hexdigit() {
            return Err(CipherError::HexSourceChar(c));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_size_from_bits() {
        assert_eq!(KeySize::from_bits(128), Ok(KeySize::Bits128));
        assert_eq!(KeySize::from_bits(192), Ok(KeySize::Bits192));
        assert_eq!(KeySize::from_bits(256), Ok(KeySize::Bits256));
        assert_eq!(KeySize::from_bits(100), Err(CipherError::InvalidKeySize(100)));
        assert_eq!(KeySize::from_bits(300), Err(CipherError::InvalidKeySize(300)));
    }

    #[test]
    fn test_generated_key_lengths() {
        assert_eq!(generate_key(KeySize::Bits128).len(), 16);
        assert_eq!(generate_key(KeySize::Bits192).len(), 24);
        assert_eq!(generate_key(KeySize::Bits256).len(), 32);
    }

    #[test]
    fn test_generated_material_is_random() {
        assert_ne!(generate_iv(), generate_iv());
        assert_ne!(
            generate_key(KeySize::Bits256).to_vec(),
            generate_key(KeySize::Bits256).to_vec()
        );
    }

    #[test]
    fn test_iv_from_hex_source() {
        let iv = iv_from_hex_source("000102030405060708090A0B0C0D0E0F").unwrap();
        assert_eq!(iv[0], 0x00);
        assert_eq!(iv[15], 0x0f);
    }

    #[test]
    fn test_iv_source_length_checked() {
        assert_eq!(
            iv_from_hex_source("AB"),
            Err(CipherError::HexSourceLength { expected: 32, actual: 2 })
        );
        assert_eq!(
            iv_from_hex_source(&"A".repeat(33)),
            Err(CipherError::HexSourceLength { expected: 32, actual: 33 })
        );
    }

    #[test]
    fn test_key_source_length_checked() {
        assert_eq!(
            key_from_hex_source(&"F".repeat(63)),
            Err(CipherError::HexSourceLength { expected: 64, actual: 63 })
        );
        assert!(key_from_hex_source(&"f".repeat(64)).is_ok());
    }

    #[test]
    fn test_hex_source_charset_checked() {
        let mut source = "A".repeat(31);
        source.push('G');
        assert_eq!(iv_from_hex_source(&source), Err(CipherError::HexSourceChar('G')));

        let mut source = "a".repeat(63);
        source.push('-');
        assert_eq!(
            key_from_hex_source(&source).map(|_| ()),
            Err(CipherError::HexSourceChar('-'))
        );
    }
}
