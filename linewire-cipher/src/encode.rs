//! Base64 and hex boundary encodings.
//!
//! Key material and ciphertext cross the process boundary as text; these
//! helpers pin down the exact dialects: standard base64 with padding, and
//! uppercase hex.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::CipherError;

/// Base64-encode a byte payload.
pub fn encode_base64(source: &[u8]) -> String {
    STANDARD.encode(source)
}

/// Decode standard base64 text.
pub fn decode_base64(source: &str) -> Result<Vec<u8>, CipherError> {
    STANDARD.decode(source).map_err(|_| CipherError::InvalidBase64)
}

/// Render bytes as uppercase hex.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Decode a hex string (either case) into bytes.
pub fn hex_to_bytes(source: &str) -> Result<Vec<u8>, CipherError> {
    hex::decode(source).map_err(|e| match e {
        hex::FromHexError::InvalidHexCharacter { c, .. } => CipherError::HexSourceChar(c),
        _ => CipherError::HexSourceLength {
            expected: source.len() + 1,
            actual: source.len(),
        },
    })
}
