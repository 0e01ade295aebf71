//! RSA cipher and the ordered key-pair workflow.
//!
//! Encryption uses the public key, decryption the private key, with PKCS#1
//! v1.5 padding. Keys cross the text boundary as base64 DER: PKCS#8 for
//! private keys, SPKI for public keys.
//!
//! Key generation is a two-step workflow: [`generate_private_key`] returns a
//! [`PendingKeyPair`] carrying the pair, and [`PendingKeyPair::public_key`]
//! consumes it by value. Ownership makes the private-then-public ordering a
//! compile-time property: there is no way to read a public key that does not
//! belong to the most recently generated private key, and no way to start a
//! second pair while still holding the first.

use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::Pkcs1v15Encrypt;
pub use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;

use crate::encode::{decode_base64, encode_base64};
use crate::error::CipherError;
use crate::Cipher;

/// RSA modulus sizes supported for generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrength {
    /// 512-bit modulus. Trivially breakable; testing only.
    Low,
    /// 1024-bit modulus.
    Medium,
    /// 2048-bit modulus.
    High,
    /// 4096-bit modulus.
    VeryHigh,
}

impl KeyStrength {
    /// Modulus size in bits.
    pub fn bits(self) -> usize {
        match self {
            Self::Low => 512,
            Self::Medium => 1024,
            Self::High => 2048,
            Self::VeryHigh => 4096,
        }
    }
}

/// A freshly generated key pair whose public half has not been handed out.
///
/// Does not implement `Clone`: the pair exists in exactly one place until it
/// is consumed.
pub struct PendingKeyPair {
    private_key: RsaPrivateKey,
}

/// Generate a new RSA key pair, returning it as a pending pair.
pub fn generate_private_key(strength: KeyStrength) -> Result<PendingKeyPair, CipherError> {
    let mut rng = OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, strength.bits())
        .map_err(|e| CipherError::Rsa(e.to_string()))?;
    Ok(PendingKeyPair { private_key })
}

impl PendingKeyPair {
    /// The pending private key.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// The pending private key as base64 PKCS#8 DER.
    pub fn base64_private_key(&self) -> Result<String, CipherError> {
        encode_private_key(&self.private_key)
    }

    /// Take the public half, consuming the pending pair.
    pub fn public_key(self) -> RsaPublicKey {
        self.private_key.to_public_key()
    }

    /// Take the public half as base64 SPKI DER, consuming the pending pair.
    pub fn base64_public_key(self) -> Result<String, CipherError> {
        encode_public_key(&self.public_key())
    }

    /// Turn the pending pair directly into a cipher.
    pub fn into_cipher(self) -> RsaCipher {
        let public_key = self.private_key.to_public_key();
        RsaCipher::new(self.private_key, public_key)
    }
}

impl fmt::Debug for PendingKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingKeyPair").finish_non_exhaustive()
    }
}

/// An RSA cipher context: one public/private key pair.
///
/// Each half is always taken from its own key material; there is no
/// construction path that derives both specs from a single key.
pub struct RsaCipher {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl RsaCipher {
    /// Build a cipher from key values.
    pub fn new(private_key: RsaPrivateKey, public_key: RsaPublicKey) -> Self {
        Self { private_key, public_key }
    }

    /// Generate a fresh pair and build a cipher over it.
    pub fn generate(strength: KeyStrength) -> Result<Self, CipherError> {
        Ok(generate_private_key(strength)?.into_cipher())
    }

    /// Build a cipher from base64 DER text (PKCS#8 private, SPKI public).
    pub fn from_base64(private_key: &str, public_key: &str) -> Result<Self, CipherError> {
        Ok(Self {
            private_key: decode_private_key(private_key)?,
            public_key: decode_public_key(public_key)?,
        })
    }

    /// The private key.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// The public key.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// The private key as base64 PKCS#8 DER.
    pub fn base64_private_key(&self) -> Result<String, CipherError> {
        encode_private_key(&self.private_key)
    }

    /// The public key as base64 SPKI DER.
    pub fn base64_public_key(&self) -> Result<String, CipherError> {
        encode_public_key(&self.public_key)
    }

    /// Replace both keys.
    pub fn set_keys(&mut self, private_key: RsaPrivateKey, public_key: RsaPublicKey) {
        self.private_key = private_key;
        self.public_key = public_key;
    }

    /// Replace both keys from base64 DER text.
    pub fn set_keys_base64(&mut self, private_key: &str, public_key: &str) -> Result<(), CipherError> {
        self.set_keys(decode_private_key(private_key)?, decode_public_key(public_key)?);
        Ok(())
    }
}

impl Cipher for RsaCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut rng = OsRng;
        self.public_key
            .encrypt(&mut rng, Pkcs1v15Encrypt, plaintext)
            .map_err(|e| CipherError::Rsa(e.to_string()))
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.private_key
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map_err(|e| CipherError::Rsa(e.to_string()))
    }
}

impl fmt::Debug for RsaCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaCipher")
            .field("modulus_bits", &self.private_key.size().saturating_mul(8))
            .finish()
    }
}

fn encode_private_key(key: &RsaPrivateKey) -> Result<String, CipherError> {
    let der = key.to_pkcs8_der().map_err(|e| CipherError::Rsa(e.to_string()))?;
    Ok(encode_base64(der.as_bytes()))
}

fn encode_public_key(key: &RsaPublicKey) -> Result<String, CipherError> {
    let der = key.to_public_key_der().map_err(|e| CipherError::Rsa(e.to_string()))?;
    Ok(encode_base64(der.as_bytes()))
}

fn decode_private_key(key: &str) -> Result<RsaPrivateKey, CipherError> {
    RsaPrivateKey::from_pkcs8_der(&decode_base64(key)?)
        .map_err(|e| CipherError::Rsa(e.to_string()))
}

fn decode_public_key(key: &str) -> Result<RsaPublicKey, CipherError> {
    RsaPublicKey::from_public_key_der(&decode_base64(key)?)
        .map_err(|e| CipherError::Rsa(e.to_string()))
}
