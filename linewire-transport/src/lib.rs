//! LineWire Transport
//!
//! Line-framed request/response messaging over TCP, with an optional
//! transparently encrypted layer.
//!
//! This crate provides:
//! - [`SocketEndpoint`]: a plain newline-delimited endpoint, client or server
//! - [`SecureEndpoint`]: a decorator that encrypts every line with any
//!   [`linewire_cipher::Cipher`], plus the [`AesEndpoint`] and
//!   [`RsaEndpoint`] aliases
//! - Listener lifecycle control: start, restart, stop, single or pooled
//!   routine dispatch
//!
//! # Invariants
//!
//! - One message per line; writes flush a full line before returning
//! - A clean peer close is `Ok(None)`, never an error
//! - Content carrying the reserved sentinel is rejected and the connection
//!   closed
//! - Client endpoints close the connection after each successful read

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod config;
pub mod endpoint;
pub mod error;
pub mod secure;

pub use config::{ConcurrencyMode, EndpointConfig};
pub use endpoint::{Connection, ResponseCode, SocketEndpoint, NEW_LINE_REPLACER};
pub use error::TransportError;
pub use secure::{AesEndpoint, RsaEndpoint, SecureEndpoint};
