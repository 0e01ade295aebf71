//! Encrypted decorator over [`SocketEndpoint`].
//!
//! Every outgoing message is encrypted and sent as a single base64 line;
//! every incoming line is base64-decoded and decrypted before it reaches the
//! caller. Framing, connection lifecycle and listener scheduling are the
//! plain endpoint's job; this layer only touches payloads.
//!
//! # Security Invariants
//!
//! - Plaintext never crosses the socket: embedded newlines are substituted
//!   with [`NEW_LINE_REPLACER`] before encryption so a multi-line message
//!   still travels as one ciphertext line, and the substitution is reversed
//!   after decryption.
//! - Plaintext that already contains the sentinel is rejected and the
//!   connection closed; there is no escaping scheme to confuse.
//! - Key rotation takes the cipher write lock, so an in-flight encrypt or
//!   decrypt always completes under one consistent key set.

use std::fmt::{self, Display};
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use std::time::Duration;

use tracing::warn;

use linewire_cipher::{
    Cipher, CipherMode, RsaCipher, RsaPrivateKey, RsaPublicKey, SymmetricCipher,
};

use crate::endpoint::{Connection, SocketEndpoint, NEW_LINE_REPLACER};
use crate::error::TransportError;

/// A [`SocketEndpoint`] over AES.
pub type AesEndpoint = SecureEndpoint<SymmetricCipher>;

/// A [`SocketEndpoint`] over RSA.
pub type RsaEndpoint = SecureEndpoint<RsaCipher>;

/// Encrypting wrapper around a plain endpoint.
pub struct SecureEndpoint<C: Cipher> {
    inner: SocketEndpoint,
    cipher: RwLock<C>,
    last_content: StdMutex<Option<String>>,
}

impl<C: Cipher> SecureEndpoint<C> {
    /// Wrap an existing endpoint.
    pub fn new(inner: SocketEndpoint, cipher: C) -> Self {
        Self {
            inner,
            cipher: RwLock::new(cipher),
            last_content: StdMutex::new(None),
        }
    }

    /// An encrypting client endpoint targeting `host:port`.
    pub fn client(host: impl Into<String>, port: u16, cipher: C) -> Self {
        Self::new(SocketEndpoint::client(host, port), cipher)
    }

    /// An encrypting server endpoint.
    pub fn server(concurrency: crate::config::ConcurrencyMode, cipher: C) -> Self {
        Self::new(SocketEndpoint::server(concurrency), cipher)
    }

    /// The underlying plain endpoint, for lifecycle control not mirrored
    /// here.
    pub fn transport(&self) -> &SocketEndpoint {
        &self.inner
    }

    /// Replace the cipher wholesale. In-flight operations finish under the
    /// old one.
    pub fn set_cipher(&self, cipher: C) {
        *self.write_cipher() = cipher;
    }

    /// Encrypt one message and write it as a base64 line on the active
    /// connection.
    pub async fn write_content<T: Display>(&self, content: T) -> Result<(), TransportError> {
        let sealed = self.seal(&content.to_string(), None).await?;
        self.inner.write_content(sealed).await
    }

    /// Encrypt one message and write it on a specific connection.
    pub async fn write_content_to<T: Display>(
        &self,
        connection: &Arc<Connection>,
        content: T,
    ) -> Result<(), TransportError> {
        let sealed = self.seal(&content.to_string(), Some(connection)).await?;
        self.inner.write_content_to(connection, sealed).await
    }

    /// Read one line from the active connection and decrypt it.
    ///
    /// `Ok(None)` is a clean close by the peer.
    pub async fn read_content(&self) -> Result<Option<String>, TransportError> {
        let line = self.inner.read_content().await?;
        self.open(line)
    }

    /// Read one line from a specific connection and decrypt it.
    pub async fn read_content_from(
        &self,
        connection: &Arc<Connection>,
    ) -> Result<Option<String>, TransportError> {
        let line = self.inner.read_content_from(connection).await?;
        self.open(line)
    }

    /// The plaintext recovered by the most recent read.
    pub fn read_last_content(&self) -> Option<String> {
        lock(&self.last_content).clone()
    }

    /// See [`SocketEndpoint::start_listener`].
    pub async fn start_listener<F, Fut>(&self, port: u16, routine: F) -> Result<u16, TransportError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.start_listener(port, routine).await
    }

    /// See [`SocketEndpoint::restart_listener`].
    pub async fn restart_listener(&self) -> Result<u16, TransportError> {
        self.inner.restart_listener().await
    }

    /// See [`SocketEndpoint::restart_listener_on`].
    pub async fn restart_listener_on(&self, port: u16) -> Result<u16, TransportError> {
        self.inner.restart_listener_on(port).await
    }

    /// See [`SocketEndpoint::accept_request`].
    pub async fn accept_request(&self) -> Result<Arc<Connection>, TransportError> {
        self.inner.accept_request().await
    }

    /// See [`SocketEndpoint::stop_listener`].
    pub fn stop_listener(&self) {
        self.inner.stop_listener()
    }

    /// See [`SocketEndpoint::continue_listening`].
    pub fn continue_listening(&self) -> bool {
        self.inner.continue_listening()
    }

    /// See [`SocketEndpoint::close_communication`].
    pub async fn close_communication(&self) {
        self.inner.close_communication().await
    }

    /// See [`SocketEndpoint::ping`].
    pub async fn ping(&self, timeout: Duration) -> Result<bool, TransportError> {
        self.inner.ping(timeout).await
    }

    /// Substitute embedded newlines and encrypt. Rejects plaintext that
    /// already carries the sentinel, closing the offending connection.
    async fn seal(
        &self,
        message: &str,
        connection: Option<&Arc<Connection>>,
    ) -> Result<String, TransportError> {
        if message.contains(NEW_LINE_REPLACER) {
            warn!("reserved token in outgoing plaintext");
            match connection {
                Some(connection) => connection.close().await,
                None => self.inner.close_communication().await,
            }
            return Err(TransportError::ReservedToken);
        }
        let single_line = message.replace('\n', NEW_LINE_REPLACER);
        let sealed = self.read_cipher().encrypt_base64(&single_line)?;
        Ok(sealed)
    }

    /// Decrypt one received line and reverse the newline substitution.
    fn open(&self, line: Option<String>) -> Result<Option<String>, TransportError> {
        let Some(sealed) = line else {
            *lock(&self.last_content) = None;
            return Ok(None);
        };
        let plaintext = self
            .read_cipher()
            .decrypt_base64(&sealed)?
            .replace(NEW_LINE_REPLACER, "\n");
        *lock(&self.last_content) = Some(plaintext.clone());
        Ok(Some(plaintext))
    }

    fn read_cipher(&self) -> std::sync::RwLockReadGuard<'_, C> {
        self.cipher.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cipher(&self) -> std::sync::RwLockWriteGuard<'_, C> {
        self.cipher.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SecureEndpoint<SymmetricCipher> {
    /// Swap in a new IV and key. Takes effect for the next operation.
    pub fn change_cipher_keys(&self, iv: &[u8], key: &[u8]) -> Result<(), TransportError> {
        let mut cipher = self.write_cipher();
        cipher.set_iv(iv)?;
        cipher.set_key(key)?;
        Ok(())
    }

    /// Swap in a new IV and key from their base64 forms.
    pub fn change_cipher_keys_base64(&self, iv: &str, key: &str) -> Result<(), TransportError> {
        let mut cipher = self.write_cipher();
        cipher.set_base64_iv(iv)?;
        cipher.set_base64_key(key)?;
        Ok(())
    }

    /// Switch the AES mode of operation, keeping the current key material.
    pub fn change_cipher_mode(&self, mode: CipherMode) {
        self.write_cipher().set_mode(mode);
    }
}

impl SecureEndpoint<RsaCipher> {
    /// Swap in a new RSA key pair. Takes effect for the next operation.
    pub fn change_cipher_keys(&self, private_key: RsaPrivateKey, public_key: RsaPublicKey) {
        self.write_cipher().set_keys(private_key, public_key);
    }

    /// Swap in a new RSA key pair from base64 DER text.
    pub fn change_cipher_keys_base64(
        &self,
        private_key: &str,
        public_key: &str,
    ) -> Result<(), TransportError> {
        self.write_cipher().set_keys_base64(private_key, public_key)?;
        Ok(())
    }
}

impl<C: Cipher + fmt::Debug> fmt::Debug for SecureEndpoint<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureEndpoint")
            .field("inner", &self.inner)
            .field("cipher", &*self.read_cipher())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
