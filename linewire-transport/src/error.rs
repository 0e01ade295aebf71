//! Transport errors.
//!
//! I/O failures, protocol violations and cipher failures are kept as distinct
//! variants: callers decide whether to reconnect after an I/O error, while a
//! cipher error points at key or payload corruption, not at the socket.
//! Nothing here is fatal to the process; every failure scopes to the
//! offending call or connection.

use std::fmt;

use linewire_cipher::CipherError;

/// Errors that can occur during transport operations.
#[derive(Debug)]
pub enum TransportError {
    // --- Connection-level ---
    /// Socket-level failure (refused, reset, broken pipe).
    Io(std::io::Error),
    /// No connection is active and this endpoint cannot open one itself.
    NoActiveConnection,

    // --- Protocol violations ---
    /// Outgoing plaintext contains the reserved newline sentinel. The
    /// connection has been closed.
    ReservedToken,

    // --- Cipher layer (distinct from I/O) ---
    /// Encryption or decryption failed.
    Cipher(CipherError),

    // --- Role & lifecycle misuse ---
    /// Operation is only valid on a server endpoint.
    ServerSideOnly(&'static str),
    /// Operation is only valid on a client endpoint.
    ClientSideOnly(&'static str),
    /// A single-mode listener routine is already running on this port.
    ListenerConflict(u16),
    /// No listener is running: never started, already stopped, or no
    /// routine stored to restart.
    ListenerNotStarted,
    /// No default response has been configured for this endpoint.
    NoDefaultResponse,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "i/o error: {}", e),
            Self::NoActiveConnection => write!(f, "no active connection"),
            Self::ReservedToken => {
                write!(f, "reserved token in outgoing content; connection closed")
            }
            Self::Cipher(e) => write!(f, "cipher error: {}", e),
            Self::ServerSideOnly(op) => {
                write!(f, "{} is only available on a server endpoint", op)
            }
            Self::ClientSideOnly(op) => {
                write!(f, "{} is only available on a client endpoint", op)
            }
            Self::ListenerConflict(port) => {
                write!(f, "a listener routine is already running on port {}", port)
            }
            Self::ListenerNotStarted => write!(f, "no listener is running"),
            Self::NoDefaultResponse => write!(f, "no default response configured"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Cipher(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<CipherError> for TransportError {
    fn from(e: CipherError) -> Self {
        Self::Cipher(e)
    }
}
