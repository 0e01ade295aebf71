//! Plain line-framed socket endpoint.
//!
//! One logical message per line: a write appends `\n`, a read consumes up to
//! it. Outgoing content containing the reserved sentinel
//! [`NEW_LINE_REPLACER`] is rejected and the connection closed, since a peer
//! could otherwise forge message boundaries.
//!
//! # Invariants
//!
//! - At most one in-flight write per connection; the write half is behind a
//!   lock and a full line is flushed before the lock is released.
//! - A clean EOF from the peer is not an error; it surfaces as `Ok(None)`.
//! - Starting a listener on the already-bound port reuses the bound socket;
//!   only a different port triggers a rebind.
//! - A client endpoint never listens, a server endpoint never dials out.
//! - `close` releases a read blocked on the same connection, and
//!   `stop_listener` releases a pending accept; they are the only
//!   cancellation primitives.

use std::fmt::{self, Display};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{ConcurrencyMode, EndpointConfig};
use crate::error::TransportError;

/// Reserved token substituted for embedded newlines by the encrypted layer.
///
/// Plaintext arriving at any write path must not already contain it; there is
/// no escaping scheme, such content is rejected outright.
pub const NEW_LINE_REPLACER: &str = "@-/-/-@";

/// Numeric response vocabulary shared by both ends of the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    /// Request served.
    Successful,
    /// Generic non-error outcome.
    GenericResponse,
    /// Requested item unknown to the peer.
    NotFound,
    /// Request failed on the peer.
    Failed,
}

impl ResponseCode {
    /// Numeric form sent on the wire.
    pub fn code(self) -> u16 {
        match self {
            Self::Successful => 200,
            Self::GenericResponse => 300,
            Self::NotFound => 404,
            Self::Failed => 500,
        }
    }
}

impl Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One accepted or dialed TCP connection, split for concurrent use.
///
/// Reads and writes each take their own lock, so a reader blocked on the
/// peer never starves writers on the same connection.
pub struct Connection {
    peer: SocketAddr,
    reader: Mutex<BufReader<OwnedReadHalf>>,
    writer: Mutex<OwnedWriteHalf>,
    shutdown: watch::Sender<bool>,
}

impl Connection {
    fn new(stream: TcpStream) -> Result<Arc<Self>, TransportError> {
        let peer = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        let (shutdown, _) = watch::channel(false);
        Ok(Arc::new(Self {
            peer,
            reader: Mutex::new(BufReader::new(read_half)),
            writer: Mutex::new(write_half),
            shutdown,
        }))
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Write one full line and flush it before releasing the write half.
    pub async fn write_line(&self, line: &str) -> Result<(), TransportError> {
        let mut frame = Vec::with_capacity(line.len() + 1);
        frame.extend_from_slice(line.as_bytes());
        frame.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read one line, without its terminator. `None` means the connection
    /// was closed, by the peer (clean EOF) or locally via
    /// [`close`](Self::close).
    pub async fn read_line(&self) -> Result<Option<String>, TransportError> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Ok(None);
        }
        let mut reader = self.reader.lock().await;
        let mut line = String::new();
        let read = tokio::select! {
            read = reader.read_line(&mut line) => read?,
            _ = shutdown.changed() => return Ok(None),
        };
        if read == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    /// Shut the connection down, releasing a read blocked on it. Safe to
    /// call more than once.
    pub async fn close(&self) {
        self.shutdown.send_replace(true);
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("peer", &self.peer).finish_non_exhaustive()
    }
}

type Routine = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// A line-framed socket endpoint, client or server.
///
/// All state is behind interior mutability so the endpoint can be shared as
/// an `Arc` between a listener routine and the code controlling it.
pub struct SocketEndpoint {
    config: EndpointConfig,
    listener: StdMutex<Option<Arc<TcpListener>>>,
    current_port: StdMutex<Option<u16>>,
    routine: StdMutex<Option<Routine>>,
    running: watch::Sender<bool>,
    workers: StdMutex<Vec<JoinHandle<()>>>,
    active: Mutex<Option<Arc<Connection>>>,
    last_content: StdMutex<Option<String>>,
    default_success: StdMutex<Option<String>>,
    default_error: StdMutex<Option<String>>,
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SocketEndpoint {
    /// A connecting endpoint targeting `host:port`. No socket is opened
    /// until the first write.
    pub fn client(host: impl Into<String>, port: u16) -> Self {
        Self::with_config(EndpointConfig::client(host, port))
    }

    /// A listening endpoint. No socket is bound until a listener starts.
    pub fn server(concurrency: ConcurrencyMode) -> Self {
        Self::with_config(EndpointConfig::server(concurrency))
    }

    /// An endpoint from an explicit configuration.
    pub fn with_config(config: EndpointConfig) -> Self {
        Self {
            config,
            listener: StdMutex::new(None),
            current_port: StdMutex::new(None),
            routine: StdMutex::new(None),
            running: watch::channel(false).0,
            workers: StdMutex::new(Vec::new()),
            active: Mutex::new(None),
            last_content: StdMutex::new(None),
            default_success: StdMutex::new(None),
            default_error: StdMutex::new(None),
        }
    }

    /// This endpoint's configuration.
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Whether this endpoint listens.
    pub fn is_server(&self) -> bool {
        self.config.is_server()
    }

    /// The port the listening socket is currently bound to, if any.
    /// Binding to port 0 records the kernel-assigned port.
    pub fn local_port(&self) -> Option<u16> {
        *lock(&self.current_port)
    }

    /// Whether listener routines should keep accepting.
    pub fn continue_listening(&self) -> bool {
        *self.running.borrow()
    }

    /// Bind (if needed) and dispatch `routine` as the listener body.
    ///
    /// The routine is stored so [`restart_listener`](Self::restart_listener)
    /// can redispatch it later. Returns the bound port. In
    /// [`ConcurrencyMode::Single`] a second start while the routine is live
    /// fails with [`TransportError::ListenerConflict`].
    pub async fn start_listener<F, Fut>(&self, port: u16, routine: F) -> Result<u16, TransportError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let routine: Routine = Arc::new(move || Box::pin(routine()));
        self.check_routine_slot()?;
        *lock(&self.routine) = Some(routine.clone());
        let bound = self.bind(port).await?;
        self.dispatch_routine(routine)?;
        Ok(bound)
    }

    /// Redispatch the stored routine on the current (or last) port,
    /// rebinding only if the socket was dropped by a stop.
    pub async fn restart_listener(&self) -> Result<u16, TransportError> {
        let port = self.local_port().ok_or(TransportError::ListenerNotStarted)?;
        self.restart_listener_on(port).await
    }

    /// Redispatch the stored routine, moving the listener to `port` if it
    /// differs from the currently bound one.
    pub async fn restart_listener_on(&self, port: u16) -> Result<u16, TransportError> {
        let routine = lock(&self.routine).clone().ok_or(TransportError::ListenerNotStarted)?;
        // Conflicts are detected before binding so a refused restart cannot
        // move the live routine's socket to the new port.
        self.check_routine_slot()?;
        let bound = self.bind(port).await?;
        self.dispatch_routine(routine)?;
        Ok(bound)
    }

    async fn bind(&self, port: u16) -> Result<u16, TransportError> {
        if !self.is_server() {
            return Err(TransportError::ServerSideOnly("start_listener"));
        }
        if lock(&self.listener).is_some() {
            if let Some(bound) = self.local_port() {
                if bound == port {
                    self.running.send_replace(true);
                    return Ok(bound);
                }
            }
        }
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let bound = listener.local_addr()?.port();
        *lock(&self.listener) = Some(Arc::new(listener));
        *lock(&self.current_port) = Some(bound);
        self.running.send_replace(true);
        debug!(port = bound, "listener bound");
        Ok(bound)
    }

    /// Fails unless another routine may be dispatched right now: in single
    /// mode the slot must be free of live routines.
    fn check_routine_slot(&self) -> Result<(), TransportError> {
        let concurrency = match &self.config {
            EndpointConfig::Server { concurrency } => *concurrency,
            EndpointConfig::Client { .. } => {
                return Err(TransportError::ServerSideOnly("start_listener"))
            }
        };
        let mut workers = lock(&self.workers);
        workers.retain(|handle| !handle.is_finished());
        if concurrency == ConcurrencyMode::Single && !workers.is_empty() {
            return Err(TransportError::ListenerConflict(self.local_port().unwrap_or(0)));
        }
        Ok(())
    }

    fn dispatch_routine(&self, routine: Routine) -> Result<(), TransportError> {
        self.check_routine_slot()?;
        lock(&self.workers).push(tokio::spawn(routine()));
        Ok(())
    }

    /// Block until a peer connects. The accepted connection becomes the
    /// active one and is also returned for per-peer use in pooled routines.
    ///
    /// A concurrent [`stop_listener`](Self::stop_listener) releases the wait
    /// with [`TransportError::ListenerNotStarted`].
    pub async fn accept_request(&self) -> Result<Arc<Connection>, TransportError> {
        if !self.is_server() {
            return Err(TransportError::ServerSideOnly("accept_request"));
        }
        let mut running = self.running.subscribe();
        let listener =
            lock(&self.listener).as_ref().cloned().ok_or(TransportError::ListenerNotStarted)?;
        if !*running.borrow() {
            return Err(TransportError::ListenerNotStarted);
        }
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    debug!(%peer, "connection accepted");
                    let connection = Connection::new(stream)?;
                    *self.active.lock().await = Some(connection.clone());
                    return Ok(connection);
                }
                _ = running.changed() => {
                    if !*running.borrow() {
                        return Err(TransportError::ListenerNotStarted);
                    }
                }
            }
        }
    }

    /// Write one message on the active connection, opening it first on a
    /// client endpoint.
    pub async fn write_content<T: Display>(&self, content: T) -> Result<(), TransportError> {
        let connection = self.obtain_connection().await?;
        self.write_content_to(&connection, content).await
    }

    /// Write one message on a specific connection.
    pub async fn write_content_to<T: Display>(
        &self,
        connection: &Arc<Connection>,
        content: T,
    ) -> Result<(), TransportError> {
        let message = content.to_string();
        if message.contains(NEW_LINE_REPLACER) {
            warn!(peer = %connection.peer_addr(), "reserved token in outgoing content");
            connection.close().await;
            self.clear_if_active(connection).await;
            return Err(TransportError::ReservedToken);
        }
        connection.write_line(&message).await
    }

    /// Read one message from the active connection.
    ///
    /// `Ok(None)` is a clean close by the peer. On a client endpoint the
    /// connection is closed after a successful read, so each write/read pair
    /// is one request/response exchange.
    pub async fn read_content(&self) -> Result<Option<String>, TransportError> {
        let connection =
            self.active.lock().await.as_ref().cloned().ok_or(TransportError::NoActiveConnection)?;
        self.read_content_from(&connection).await
    }

    /// Read one message from a specific connection.
    pub async fn read_content_from(
        &self,
        connection: &Arc<Connection>,
    ) -> Result<Option<String>, TransportError> {
        let line = connection.read_line().await?;
        *lock(&self.last_content) = line.clone();
        match line {
            None => {
                debug!(peer = %connection.peer_addr(), "peer closed connection");
                connection.close().await;
                self.clear_if_active(connection).await;
                Ok(None)
            }
            Some(raw) => {
                if !self.is_server() {
                    connection.close().await;
                    self.clear_if_active(connection).await;
                }
                Ok(Some(raw.replace(NEW_LINE_REPLACER, "\n")))
            }
        }
    }

    /// The raw line cached by the most recent read, before any sentinel
    /// reversal.
    pub fn read_last_content(&self) -> Option<String> {
        lock(&self.last_content).clone()
    }

    /// Record the message [`send_success_response`](Self::send_success_response)
    /// will emit.
    pub fn set_default_success_response<T: Display>(&self, content: T) {
        *lock(&self.default_success) = Some(content.to_string());
    }

    /// Record the message [`send_error_response`](Self::send_error_response)
    /// will emit.
    pub fn set_default_error_response<T: Display>(&self, content: T) {
        *lock(&self.default_error) = Some(content.to_string());
    }

    /// Send the configured success response on the active connection.
    pub async fn send_success_response(&self) -> Result<(), TransportError> {
        let response = lock(&self.default_success).clone().ok_or(TransportError::NoDefaultResponse)?;
        self.write_content(response).await
    }

    /// Send the configured success response on a specific connection.
    pub async fn send_success_response_to(
        &self,
        connection: &Arc<Connection>,
    ) -> Result<(), TransportError> {
        let response = lock(&self.default_success).clone().ok_or(TransportError::NoDefaultResponse)?;
        self.write_content_to(connection, response).await
    }

    /// Send the configured error response on the active connection.
    pub async fn send_error_response(&self) -> Result<(), TransportError> {
        let response = lock(&self.default_error).clone().ok_or(TransportError::NoDefaultResponse)?;
        self.write_content(response).await
    }

    /// Send the configured error response on a specific connection.
    pub async fn send_error_response_to(
        &self,
        connection: &Arc<Connection>,
    ) -> Result<(), TransportError> {
        let response = lock(&self.default_error).clone().ok_or(TransportError::NoDefaultResponse)?;
        self.write_content_to(connection, response).await
    }

    /// Whether `host:port` accepts a TCP connection within `timeout`.
    pub async fn ping_host(host: &str, port: u16, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        )
    }

    /// Whether this client endpoint's target accepts a TCP connection
    /// within `timeout`.
    pub async fn ping(&self, timeout: Duration) -> Result<bool, TransportError> {
        match &self.config {
            EndpointConfig::Client { host, port } => {
                Ok(Self::ping_host(host, *port, timeout).await)
            }
            EndpointConfig::Server { .. } => Err(TransportError::ClientSideOnly("ping")),
        }
    }

    /// Stop accepting: clear the running flag (releasing pending accepts),
    /// abort dispatched routines and drop the listening socket. Idempotent.
    pub fn stop_listener(&self) {
        self.running.send_replace(false);
        for handle in lock(&self.workers).drain(..) {
            handle.abort();
        }
        if lock(&self.listener).take().is_some() {
            debug!(port = self.local_port(), "listener stopped");
        }
    }

    /// Close the active connection, if any. Idempotent.
    pub async fn close_communication(&self) {
        if let Some(connection) = self.active.lock().await.take() {
            connection.close().await;
            debug!(peer = %connection.peer_addr(), "communication closed");
        }
    }

    async fn obtain_connection(&self) -> Result<Arc<Connection>, TransportError> {
        let mut active = self.active.lock().await;
        if let Some(connection) = active.as_ref() {
            return Ok(connection.clone());
        }
        match &self.config {
            EndpointConfig::Client { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                debug!(host = host.as_str(), port, "connected to server");
                let connection = Connection::new(stream)?;
                *active = Some(connection.clone());
                Ok(connection)
            }
            EndpointConfig::Server { .. } => Err(TransportError::NoActiveConnection),
        }
    }

    async fn clear_if_active(&self, connection: &Arc<Connection>) {
        let mut active = self.active.lock().await;
        if active.as_ref().is_some_and(|current| Arc::ptr_eq(current, connection)) {
            *active = None;
        }
    }
}

impl fmt::Debug for SocketEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketEndpoint")
            .field("config", &self.config)
            .field("port", &self.local_port())
            .field("running", &self.continue_listening())
            .finish_non_exhaustive()
    }
}
