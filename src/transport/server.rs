//! WebSocket server and connection registry.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                 Server                  │
//! │  accept loop ──► upgrade ──► Conn       │
//! │                               │         │
//! │  ┌────────── Registry ────────▼──────┐  │
//! │  │ ConnId=a1.. → Conn                 │  │
//! │  │ ConnId=b2.. → Conn                 │  │
//! │  └──────────▲─────────────────────────┘  │
//! │     removal worker ◄── Conn::close       │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Each accepted connection gets a fresh [`ConnId`], its own
//! [`SessionDirectory`] from the factory, and is removed from the registry
//! asynchronously when it closes.

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::result::Result as StdResult;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::conn::{Conn, ConnOptions, Role};
use crate::error::{Error, Result};
use crate::identifiers::ConnId;
use crate::session::SessionDirectory;

use super::socket::RequestInfo;
use super::websocket::WsSocket;

// ============================================================================
// Constants
// ============================================================================

/// Default bind address (localhost, random port).
const DEFAULT_BIND: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);

/// Default capacity of the removal queue.
const DEFAULT_REMOVAL_CAPACITY: usize = 256;

// ============================================================================
// Types
// ============================================================================

/// Builds the session directory for a newly accepted connection.
pub type DirectoryFactory = Arc<dyn Fn(&ConnId) -> Arc<dyn SessionDirectory> + Send + Sync>;

// ============================================================================
// ServerOptions
// ============================================================================

/// Server configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerOptions {
    /// Address to bind. Port 0 picks a random port.
    pub bind: SocketAddr,

    /// Options applied to every accepted connection.
    pub conn: ConnOptions,

    /// Capacity of the removal queue fed by closing connections.
    pub removal_capacity: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerOptions {
    /// Creates options bound to `127.0.0.1:0`.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bind: DEFAULT_BIND,
            conn: ConnOptions::new(),
            removal_capacity: DEFAULT_REMOVAL_CAPACITY,
        }
    }

    /// Sets the bind address.
    #[inline]
    #[must_use]
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Sets per-connection options.
    #[inline]
    #[must_use]
    pub fn with_conn(mut self, conn: ConnOptions) -> Self {
        self.conn = conn;
        self
    }

    /// Sets the removal queue capacity.
    #[inline]
    #[must_use]
    pub fn with_removal_capacity(mut self, capacity: usize) -> Self {
        self.removal_capacity = capacity;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.removal_capacity == 0 {
            return Err(Error::config("removal_capacity must be greater than zero"));
        }
        self.conn.validate()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Live server-side connections keyed by id.
///
/// Thread-safe. Connections remove themselves through a bounded queue
/// drained by a background worker, so `Conn::close` never waits on it.
pub struct Registry {
    connections: RwLock<FxHashMap<ConnId, Conn>>,
    removal_tx: mpsc::Sender<ConnId>,
}

impl Registry {
    /// Creates a registry and spawns its removal worker.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn new(removal_capacity: usize) -> Arc<Self> {
        let (removal_tx, removal_rx) = mpsc::channel(removal_capacity.max(1));
        let registry = Arc::new(Self {
            connections: RwLock::new(FxHashMap::default()),
            removal_tx,
        });

        tokio::spawn(Self::removal_loop(Arc::downgrade(&registry), removal_rx));
        registry
    }

    /// Returns a sender for [`ConnBuilder::removal`](crate::conn::ConnBuilder::removal).
    #[inline]
    #[must_use]
    pub fn removal_sender(&self) -> mpsc::Sender<ConnId> {
        self.removal_tx.clone()
    }

    /// Generates an id not currently in use.
    #[must_use]
    pub fn next_id(&self) -> ConnId {
        loop {
            let id = ConnId::generate();
            if !self.connections.read().contains_key(&id) {
                return id;
            }
        }
    }

    /// Registers a connection under its id.
    pub fn insert(&self, conn: Conn) {
        self.connections.write().insert(conn.id(), conn);
    }

    /// Returns the connection with `id`.
    #[must_use]
    pub fn get(&self, id: &ConnId) -> Option<Conn> {
        self.connections.read().get(id).cloned()
    }

    /// Returns the number of live connections.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Returns `true` if no connection is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Closes every connection.
    pub fn close_all(&self) {
        let connections: Vec<_> = self.connections.read().values().cloned().collect();
        for conn in connections {
            conn.close();
        }
    }

    async fn removal_loop(registry: Weak<Self>, mut removal_rx: mpsc::Receiver<ConnId>) {
        while let Some(id) = removal_rx.recv().await {
            let Some(registry) = registry.upgrade() else {
                break;
            };
            if registry.connections.write().remove(&id).is_some() {
                debug!(conn_id = %id, "Connection removed from registry");
            }
        }
        debug!("Removal worker terminated");
    }
}

// ============================================================================
// Server
// ============================================================================

/// Accepts WebSocket connections and runs a server-role [`Conn`] for each.
///
/// # Example
///
/// ```ignore
/// let factory: DirectoryFactory = Arc::new(|_id| Arc::new(MyDirectory::default()));
/// let server = Server::bind(ServerOptions::new(), factory).await?;
/// println!("listening on {}", server.ws_url());
/// ```
pub struct Server {
    local_addr: SocketAddr,
    registry: Arc<Registry>,
    shutdown: CancellationToken,
}

impl Server {
    /// Binds and starts the accept loop.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if options are invalid
    /// - [`Error::Io`] if binding fails
    pub async fn bind(options: ServerOptions, directories: DirectoryFactory) -> Result<Self> {
        options.validate()?;

        let listener = TcpListener::bind(options.bind).await?;
        let local_addr = listener.local_addr()?;
        let registry = Registry::new(options.removal_capacity);
        let shutdown = CancellationToken::new();

        tokio::spawn(accept_loop(
            listener,
            Arc::clone(&registry),
            directories,
            options.conn,
            shutdown.clone(),
        ));

        info!(%local_addr, "Server started");

        Ok(Self {
            local_addr,
            registry,
            shutdown,
        })
    }

    /// Returns the bound address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the WebSocket URL for this server.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Returns the connection registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Stops accepting and closes every connection.
    pub fn shutdown(&self) {
        info!("Server shutting down");
        self.shutdown.cancel();
        self.registry.close_all();
    }
}

// ============================================================================
// Accept Loop
// ============================================================================

async fn accept_loop(
    listener: TcpListener,
    registry: Arc<Registry>,
    directories: DirectoryFactory,
    options: ConnOptions,
    shutdown: CancellationToken,
) {
    debug!("Accept loop started");

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                let registry = Arc::clone(&registry);
                let directories = Arc::clone(&directories);
                tokio::spawn(async move {
                    if let Err(e) =
                        handle_connection(stream, addr, &registry, &directories, options).await
                    {
                        warn!(error = %e, ?addr, "Connection handling failed");
                    }
                });
            }
            Err(e) => error!(error = %e, "Accept failed"),
        }
    }

    debug!("Accept loop terminated");
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: &Registry,
    directories: &DirectoryFactory,
    options: ConnOptions,
) -> Result<()> {
    let mut request = RequestInfo {
        remote_addr: Some(addr),
        ..Default::default()
    };

    let capture = |req: &Request, resp: Response| -> StdResult<Response, ErrorResponse> {
        request.path = req.uri().to_string();
        request.headers = req
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_owned(),
                    value.to_str().unwrap_or_default().to_owned(),
                )
            })
            .collect();
        Ok(resp)
    };

    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, capture)
        .await
        .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

    let id = registry.next_id();
    let conn = Conn::builder(Arc::new(WsSocket::new(ws_stream, request)), directories(&id))
        .role(Role::Server)
        .id(id.clone())
        .options(options)
        .removal(registry.removal_sender())
        .build()?;

    registry.insert(conn.clone());
    conn.start()?;

    info!(conn_id = %id, ?addr, "Connection accepted");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::time::timeout;

    use crate::conn::CallContext;
    use crate::protocol::Message;
    use crate::test_support::{StubDirectory, init_tracing};
    use crate::transport::dial;

    fn stub_factory() -> DirectoryFactory {
        Arc::new(|_id: &ConnId| {
            Arc::new(StubDirectory::new().with_namespace("/chat", &[])) as Arc<dyn SessionDirectory>
        })
    }

    async fn eventually(check: impl Fn() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[test]
    #[should_panic]
    fn test_registry_requires_runtime() {
        let _ = Registry::new(8);
    }

    #[tokio::test]
    async fn test_registry_worker_removes_queued_ids() {
        let registry = Registry::new(8);
        let (socket, _peer) = crate::transport::MemorySocket::pair();
        let id = registry.next_id();
        let conn = Conn::builder(Arc::new(socket), Arc::new(StubDirectory::new()))
            .role(Role::Server)
            .id(id.clone())
            .removal(registry.removal_sender())
            .build()
            .unwrap();
        registry.insert(conn.clone());
        assert_eq!(registry.len(), 1);

        conn.close();
        eventually(|| registry.is_empty()).await;
    }

    #[tokio::test]
    async fn test_server_bind_random_port() {
        let server = Server::bind(ServerOptions::new(), stub_factory())
            .await
            .expect("bind should succeed");

        assert!(server.local_addr().port() > 0);
        assert!(server.ws_url().starts_with("ws://127.0.0.1:"));
        assert!(server.registry().is_empty());
        server.shutdown();
    }

    #[tokio::test]
    async fn test_invalid_options_rejected() {
        let options = ServerOptions::new().with_removal_capacity(0);
        assert!(matches!(
            Server::bind(options, stub_factory()).await,
            Err(Error::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_dial_handshake_and_ask() -> anyhow::Result<()> {
        init_tracing();
        let server = Server::bind(ServerOptions::new(), stub_factory()).await?;

        let directory = Arc::new(StubDirectory::new().with_namespace("/chat", &[]));
        let client = dial(&server.ws_url(), directory, ConnOptions::new()).await?;

        let ctx = CallContext::with_timeout(Duration::from_secs(5));
        client.wait_connect(&ctx, "/chat").await?;
        eventually(|| server.registry().len() == 1).await;

        let server_conn = server
            .registry()
            .get(&client.id())
            .ok_or_else(|| anyhow::anyhow!("client id {} not in registry", client.id()))?;
        eventually(|| server_conn.is_acknowledged()).await;

        let reply = client
            .ask(&ctx, Message::new("/chat", "echo", b"ping".to_vec()))
            .await?;
        assert_eq!(reply.body, b"ping");

        let err = client
            .ask(&ctx, Message::new("/chat", "fail", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Remote { .. }));

        server.shutdown();
        Ok(())
    }

    #[tokio::test]
    async fn test_closed_connection_leaves_registry() {
        let server = Server::bind(ServerOptions::new(), stub_factory())
            .await
            .unwrap();

        let client = dial(
            &server.ws_url(),
            Arc::new(StubDirectory::new()),
            ConnOptions::new(),
        )
        .await
        .unwrap();

        eventually(|| server.registry().len() == 1).await;
        client.close();
        eventually(|| server.registry().is_empty()).await;

        server.shutdown();
    }

    #[tokio::test]
    async fn test_client_connect_negotiates_namespace() {
        let server = Server::bind(
            ServerOptions::new(),
            Arc::new(|_id: &ConnId| Arc::new(StubDirectory::new()) as Arc<dyn SessionDirectory>),
        )
        .await
        .unwrap();

        let directory = Arc::new(StubDirectory::new());
        let client = dial(&server.ws_url(), directory.clone(), ConnOptions::new())
            .await
            .unwrap();

        let ctx = CallContext::with_timeout(Duration::from_secs(5));
        eventually(|| client.is_acknowledged()).await;
        let ns = client.connect(&ctx, "/news").await.unwrap();
        assert_eq!(ns.namespace(), "/news");

        let server_conn = server.registry().get(&client.id()).unwrap();
        assert!(server_conn.directory().namespace("/news").is_some());

        client.disconnect_from(&ctx, "/news").await.unwrap();
        assert!(client.directory().namespace("/news").is_none());

        server.shutdown();
    }
}
