//! LineWire Cipher Engine
//!
//! Pluggable encrypt/decrypt capability for the LineWire transport.
//!
//! This crate provides:
//! - A [`Cipher`] capability trait with base64 boundary variants
//! - [`SymmetricCipher`]: AES in CBC, CFB, OFB and CTR modes
//! - [`RsaCipher`]: an RSA key pair (public encrypts, private decrypts)
//! - Key and IV factories in byte, base64 and hex-source forms
//!
//! # Invariants
//!
//! - Configuration errors (bad algorithm name, bad key size, malformed
//!   hex/base64 source) fail at construction time, never at use time
//! - A validly constructed cipher always round-trips: `decrypt(encrypt(p)) == p`
//! - Secret key bytes are zeroized when a cipher is dropped

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod asymmetric;
pub mod encode;
pub mod error;
pub mod keys;
pub mod symmetric;

pub use asymmetric::{
    generate_private_key, KeyStrength, PendingKeyPair, RsaCipher, RsaPrivateKey, RsaPublicKey,
};
pub use error::CipherError;
pub use keys::KeySize;
pub use symmetric::{CipherMode, SymmetricCipher};

use encode::{decode_base64, encode_base64};

/// The encrypt/decrypt capability the secure transport is parameterized by.
///
/// Implementations work on opaque byte payloads; the provided base64 variants
/// encode and decode at the boundary so the same engine can be driven either
/// programmatically or from serialized text.
pub trait Cipher {
    /// Encrypt an opaque byte payload.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;

    /// Decrypt an opaque byte payload.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;

    /// Encrypt UTF-8 text and base64-encode the ciphertext.
    fn encrypt_base64(&self, plaintext: &str) -> Result<String, CipherError> {
        Ok(encode_base64(&self.encrypt(plaintext.as_bytes())?))
    }

    /// Base64-decode a ciphertext and decrypt it back to UTF-8 text.
    fn decrypt_base64(&self, ciphertext: &str) -> Result<String, CipherError> {
        let plaintext = self.decrypt(&decode_base64(ciphertext)?)?;
        String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)
    }
}
