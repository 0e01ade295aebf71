//! Cipher errors.
//!
//! Configuration errors are raised synchronously at construction or factory
//! time and are never retried. Runtime errors (bad padding, RSA failure)
//! surface per call, kept distinct from transport I/O errors.

use std::fmt;

/// All possible cipher-layer errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// Algorithm name does not map to a supported cipher mode.
    UnsupportedAlgorithm(String),

    /// Key is not 128, 192 or 256 bits. Carries the offending bit count.
    InvalidKeySize(usize),

    /// IV is not exactly 16 bytes. Carries the offending byte count.
    InvalidIvLength(usize),

    /// Hex source string has the wrong length.
    HexSourceLength {
        /// Required number of hex characters.
        expected: usize,
        /// Actual number of characters supplied.
        actual: usize,
    },

    /// Hex source string contains a non-hex character.
    HexSourceChar(char),

    /// Malformed base64 content.
    InvalidBase64,

    /// Padding check failed on decryption (corrupted or mismatched key/IV).
    BadPadding,

    /// Decrypted content is not valid UTF-8.
    InvalidUtf8,

    /// Underlying RSA operation failed (key too small for payload, bad key
    /// encoding, generation failure).
    Rsa(String),
}

impl fmt::Display for CipherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedAlgorithm(name) => write!(f, "unsupported algorithm: {}", name),
            Self::InvalidKeySize(bits) => {
                write!(f, "invalid key size: {} bits (expected 128, 192 or 256)", bits)
            }
            Self::InvalidIvLength(len) => {
                write!(f, "invalid iv length: {} bytes (expected 16)", len)
            }
            Self::HexSourceLength { expected, actual } => write!(
                f,
                "hex source must have exactly {} characters, actual length: {}",
                expected, actual
            ),
            Self::HexSourceChar(c) => {
                write!(f, "hex source may only contain 0-9, a-f and A-F, found {:?}", c)
            }
            Self::InvalidBase64 => write!(f, "malformed base64 content"),
            Self::BadPadding => write!(f, "bad padding in ciphertext"),
            Self::InvalidUtf8 => write!(f, "decrypted content is not valid utf-8"),
            Self::Rsa(msg) => write!(f, "rsa failure: {}", msg),
        }
    }
}

impl std::error::Error for CipherError {}
