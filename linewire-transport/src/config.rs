//! Endpoint configuration.

/// How a server endpoint schedules its listener routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyMode {
    /// One dedicated routine at a time; a second `start_listener` while the
    /// routine is live is a listener conflict.
    Single,
    /// Every `start_listener`/`restart_listener` invocation dispatches another
    /// routine onto the runtime's pool; accepted peers are served in parallel
    /// with no ordering guarantee between them.
    Pooled,
}

/// Which end of the wire this endpoint is.
///
/// A client owns no socket until it actively connects; a server owns a
/// listening socket once a listener is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointConfig {
    /// Connecting endpoint. Lazily opens a connection to `host:port` on the
    /// first write.
    Client {
        /// Peer host name or address.
        host: String,
        /// Peer port.
        port: u16,
    },
    /// Listening endpoint.
    Server {
        /// Listener scheduling mode.
        concurrency: ConcurrencyMode,
    },
}

impl EndpointConfig {
    /// Configuration for a connecting endpoint.
    pub fn client(host: impl Into<String>, port: u16) -> Self {
        Self::Client { host: host.into(), port }
    }

    /// Configuration for a listening endpoint.
    pub fn server(concurrency: ConcurrencyMode) -> Self {
        Self::Server { concurrency }
    }

    /// Whether this endpoint listens.
    pub fn is_server(&self) -> bool {
        matches!(self, Self::Server { .. })
    }
}
