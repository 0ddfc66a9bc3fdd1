//! Connection handle, write gate, request/reply and teardown.
//!
//! # Thread Safety
//!
//! [`Conn`] is a cheap `Clone` handle (`Arc` inside) and is `Send + Sync`.
//! `write`, `ask`, `connect` and `close` may be called from any number of
//! tasks while the read loop runs.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ConnId, WaitToken};
use crate::protocol::{Codec, JsonCodec, Message};
use crate::session::{NamespaceSession, SessionDirectory};
use crate::transport::Socket;

use super::handshake::policy_for;
use super::reader;
use super::waiting::WaitRegistry;
use super::{CallContext, ConnOptions, Role};

// ============================================================================
// Constants
// ============================================================================

/// How far in the past an `ask` deadline may lie before it is rejected up front.
const DEADLINE_GRACE: Duration = Duration::from_secs(1);

// ============================================================================
// Inner
// ============================================================================

struct Inner {
    /// Assigned by the registry, or adopted during the client handshake.
    id: RwLock<ConnId>,
    role: Role,
    socket: Arc<dyn Socket>,
    directory: Arc<dyn SessionDirectory>,
    codec: Arc<dyn Codec>,
    options: ConnOptions,

    /// Set exactly once by `close`.
    closed: AtomicBool,
    /// This side completed its half of the handshake.
    acknowledged: AtomicBool,
    /// Wakes `connect` / `wait_connect` on acknowledgement.
    ack_notify: Notify,
    /// Cancelled by `close`.
    shutdown: CancellationToken,

    waiting: WaitRegistry,
    reader_started: AtomicBool,
    /// Registry removal queue (server role).
    removal: Option<mpsc::Sender<ConnId>>,
}

// ============================================================================
// Conn
// ============================================================================

/// One protocol connection.
#[derive(Clone)]
pub struct Conn {
    inner: Arc<Inner>,
}

impl Conn {
    /// Starts configuring a connection over `socket`.
    #[inline]
    #[must_use]
    pub fn builder(socket: Arc<dyn Socket>, directory: Arc<dyn SessionDirectory>) -> ConnBuilder {
        ConnBuilder::new(socket, directory)
    }

    /// Spawns the read loop.
    ///
    /// Client connections open the handshake from inside the loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the loop was already started.
    pub fn start(&self) -> Result<JoinHandle<()>> {
        if self.inner.reader_started.swap(true, Ordering::AcqRel) {
            return Err(Error::protocol("read loop already started"));
        }

        let policy = policy_for(self.inner.role);
        Ok(tokio::spawn(reader::run(self.clone(), policy)))
    }
}

// ============================================================================
// Conn - Accessors
// ============================================================================

impl Conn {
    /// Returns the connection id.
    #[must_use]
    pub fn id(&self) -> ConnId {
        self.inner.id.read().clone()
    }

    /// Returns the role chosen at construction.
    #[inline]
    #[must_use]
    pub fn role(&self) -> Role {
        self.inner.role
    }

    /// Returns `true` for the dialing side.
    #[inline]
    #[must_use]
    pub fn is_client(&self) -> bool {
        self.inner.role.is_client()
    }

    /// Returns the underlying transport.
    #[inline]
    #[must_use]
    pub fn socket(&self) -> &Arc<dyn Socket> {
        &self.inner.socket
    }

    /// Returns the session directory.
    #[inline]
    #[must_use]
    pub fn directory(&self) -> &Arc<dyn SessionDirectory> {
        &self.inner.directory
    }

    /// Returns the options in effect.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnOptions {
        &self.inner.options
    }

    /// Returns `true` once this side finished its handshake half.
    #[inline]
    #[must_use]
    pub fn is_acknowledged(&self) -> bool {
        self.inner.acknowledged.load(Ordering::Acquire)
    }

    /// Returns `true` once `close` ran.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Returns the number of `ask` calls waiting for a reply.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.waiting.len()
    }

    pub(crate) fn codec(&self) -> &Arc<dyn Codec> {
        &self.inner.codec
    }

    pub(crate) fn waiting(&self) -> &WaitRegistry {
        &self.inner.waiting
    }

    pub(crate) fn set_id(&self, id: ConnId) {
        *self.inner.id.write() = id;
    }

    pub(crate) fn set_acknowledged(&self) {
        self.inner.acknowledged.store(true, Ordering::Release);
        self.inner.ack_notify.notify_waiters();
        debug!(conn_id = %self.id(), role = ?self.inner.role, "Connection acknowledged");
    }
}

// ============================================================================
// Conn - Write Gate
// ============================================================================

impl Conn {
    /// Writes `msg` if this connection may speak into its namespace and room.
    ///
    /// Returns `false` without touching the transport when the connection
    /// is closed, the namespace is not connected, or the room is not joined.
    /// Control-plane messages bypass the checks they negotiate.
    pub async fn write(&self, msg: Message) -> bool {
        if self.is_closed() {
            return false;
        }

        if !msg.is_connect() && !msg.is_disconnect() {
            let Some(ns) = self.inner.directory.namespace(&msg.namespace) else {
                trace!(namespace = %msg.namespace, "Write rejected: namespace not connected");
                return false;
            };

            if !msg.room.is_empty()
                && !msg.is_room_join()
                && !msg.is_room_leave()
                && !ns.is_joined(&msg.room)
            {
                trace!(namespace = %msg.namespace, room = %msg.room, "Write rejected: room not joined");
                return false;
            }
        }

        let frame = match self.inner.codec.encode(&msg) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, event = %msg.event, "Failed to encode message");
                return false;
            }
        };

        match self.write_frame(&frame).await {
            Ok(()) => true,
            Err(e) => {
                if e.is_close_error() {
                    self.close();
                }
                debug!(conn_id = %self.id(), error = %e, "Write failed");
                false
            }
        }
    }

    /// Writes a raw frame, bypassing the gate.
    pub(crate) async fn write_frame(&self, frame: &str) -> Result<()> {
        self.inner
            .socket
            .write_text(frame, self.inner.options.write_timeout)
            .await
    }
}

// ============================================================================
// Conn - Request/Reply
// ============================================================================

impl Conn {
    /// Sends `msg` and waits for the correlated reply.
    ///
    /// # Errors
    ///
    /// - [`Error::Write`] if closed or the write gate rejected `msg`
    /// - [`Error::DeadlineExceeded`] if `ctx` already expired or expires while waiting
    /// - [`Error::Cancelled`] if `ctx` is cancelled while waiting
    /// - [`Error::ConnectionClosed`] if the connection closes while waiting
    /// - [`Error::Remote`] if the reply carries an error
    pub async fn ask(&self, ctx: &CallContext, msg: Message) -> Result<Message> {
        let reply = self.exchange(ctx, msg).await?;
        match &reply.err {
            Some(err) => Err(Error::remote(err.clone())),
            None => Ok(reply),
        }
    }

    /// Like [`ask`](Self::ask) but folds failures into the returned message.
    ///
    /// A reply carrying an error is returned as received; local failures
    /// produce a message whose `err` holds the failure text.
    pub async fn write_and_wait(&self, ctx: &CallContext, msg: Message) -> Message {
        match self.exchange(ctx, msg).await {
            Ok(reply) => reply,
            Err(e) => Message::from_error(e),
        }
    }

    async fn exchange(&self, ctx: &CallContext, mut msg: Message) -> Result<Message> {
        if self.is_closed() {
            return Err(Error::Write);
        }
        ctx.check_expired(DEADLINE_GRACE)?;

        let token = WaitToken::generate(self.inner.role);
        msg.wait = Some(token.clone());
        let reply_rx = self.inner.waiting.register(token.clone());

        if !self.write(msg).await {
            self.inner.waiting.remove(&token);
            return Err(Error::Write);
        }

        trace!(conn_id = %self.id(), %token, "Waiting for reply");

        tokio::select! {
            err = ctx.done() => {
                self.inner.waiting.remove(&token);
                Err(err)
            }
            reply = reply_rx => reply.map_err(|_| Error::ConnectionClosed),
        }
    }
}

// ============================================================================
// Conn - Namespaces
// ============================================================================

impl Conn {
    /// Connects to `namespace` through the session directory.
    ///
    /// Server connections first wait for their own acknowledgement.
    ///
    /// # Errors
    ///
    /// Propagates `ctx` expiry, [`Error::ConnectionClosed`], and directory errors.
    pub async fn connect(
        &self,
        ctx: &CallContext,
        namespace: &str,
    ) -> Result<Arc<dyn NamespaceSession>> {
        if !self.is_client() {
            self.wait_until(ctx, |conn| conn.is_acknowledged().then_some(()))
                .await?;
        }

        self.inner.directory.ask_connect(ctx, self, namespace).await
    }

    /// Waits until `namespace` is connected and this side is acknowledged.
    ///
    /// Does not negotiate anything; the peer or another task must connect.
    ///
    /// # Errors
    ///
    /// Propagates `ctx` expiry and [`Error::ConnectionClosed`].
    pub async fn wait_connect(
        &self,
        ctx: &CallContext,
        namespace: &str,
    ) -> Result<Arc<dyn NamespaceSession>> {
        self.wait_until(ctx, |conn| {
            if conn.is_acknowledged() {
                conn.inner.directory.namespace(namespace)
            } else {
                None
            }
        })
        .await
    }

    /// Gracefully disconnects from `namespace`.
    pub async fn disconnect_from(&self, ctx: &CallContext, namespace: &str) -> Result<()> {
        self.inner.directory.ask_disconnect(ctx, self, namespace).await
    }

    /// Gracefully disconnects from every namespace.
    pub async fn disconnect_from_all(&self, ctx: &CallContext) -> Result<()> {
        self.inner.directory.disconnect_all(ctx, self).await
    }

    /// Re-evaluates `ready` on acknowledgement or every `sync_wait` tick.
    async fn wait_until<T>(
        &self,
        ctx: &CallContext,
        ready: impl Fn(&Self) -> Option<T>,
    ) -> Result<T> {
        loop {
            let acknowledged = self.inner.ack_notify.notified();

            if let Some(value) = ready(self) {
                return Ok(value);
            }
            if self.is_closed() {
                return Err(Error::ConnectionClosed);
            }

            tokio::select! {
                _ = acknowledged => {}
                _ = sleep(self.inner.options.sync_wait) => {}
                err = ctx.done() => return Err(err),
                _ = self.inner.shutdown.cancelled() => return Err(Error::ConnectionClosed),
            }
        }
    }
}

// ============================================================================
// Conn - Lifecycle
// ============================================================================

impl Conn {
    /// Closes the connection. Only the first call has any effect.
    ///
    /// Teardown order: cancel waiters, force-disconnect every namespace,
    /// drop pending replies (their `ask` callers fail with
    /// [`Error::ConnectionClosed`]), reset acknowledgement, queue registry
    /// removal, close the transport.
    pub fn close(&self) {
        if self
            .inner
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        self.inner.shutdown.cancel();
        self.inner.directory.force_disconnect_all();
        let dropped = self.inner.waiting.clear();
        self.inner.acknowledged.store(false, Ordering::Release);

        let id = self.id();
        if let Some(removal) = &self.inner.removal {
            notify_removal(removal, id.clone());
        }

        self.inner.socket.close();

        debug!(conn_id = %id, pending = dropped, "Connection closed");
    }
}

/// Queues `id` for removal without blocking the caller.
///
/// A full queue is retried in the background: on the current runtime if
/// there is one, otherwise on a helper thread.
fn notify_removal(removal: &mpsc::Sender<ConnId>, id: ConnId) {
    match removal.try_send(id) {
        Ok(()) | Err(TrySendError::Closed(_)) => {}
        Err(TrySendError::Full(id)) => {
            let removal = removal.clone();
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    let _ = removal.send(id).await;
                });
                return;
            }

            trace!(conn_id = %id, "Removal queue full outside runtime, retrying on a thread");
            let spawned = std::thread::Builder::new()
                .name("roomwire-removal".into())
                .spawn(move || {
                    let _ = removal.blocking_send(id);
                });
            if let Err(e) = spawned {
                warn!(error = %e, "Failed to queue registry removal");
            }
        }
    }
}

impl fmt::Display for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("id", &self.id())
            .field("role", &self.inner.role)
            .field("acknowledged", &self.is_acknowledged())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// ConnBuilder
// ============================================================================

/// Builder for [`Conn`].
///
/// Use [`Conn::builder`] to create one.
pub struct ConnBuilder {
    socket: Arc<dyn Socket>,
    directory: Arc<dyn SessionDirectory>,
    role: Role,
    id: ConnId,
    options: ConnOptions,
    codec: Arc<dyn Codec>,
    removal: Option<mpsc::Sender<ConnId>>,
}

impl ConnBuilder {
    fn new(socket: Arc<dyn Socket>, directory: Arc<dyn SessionDirectory>) -> Self {
        Self {
            socket,
            directory,
            role: Role::Client,
            id: ConnId::default(),
            options: ConnOptions::new(),
            codec: Arc::new(JsonCodec),
            removal: None,
        }
    }

    /// Sets the role. Defaults to [`Role::Client`].
    #[inline]
    #[must_use]
    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Sets the id. Required for server connections.
    #[inline]
    #[must_use]
    pub fn id(mut self, id: ConnId) -> Self {
        self.id = id;
        self
    }

    /// Sets the options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ConnOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the default JSON codec.
    #[inline]
    #[must_use]
    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Sets the registry removal queue notified on close.
    #[inline]
    #[must_use]
    pub fn removal(mut self, removal: mpsc::Sender<ConnId>) -> Self {
        self.removal = Some(removal);
        self
    }

    /// Builds the connection. The read loop is not started.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if options are invalid
    /// - [`Error::Config`] if a server connection has no id
    /// - [`Error::Config`] if a client connection has a removal queue
    pub fn build(self) -> Result<Conn> {
        self.options.validate()?;

        match self.role {
            Role::Server if self.id.is_empty() => {
                return Err(Error::config("server connections need an id"));
            }
            Role::Client if self.removal.is_some() => {
                return Err(Error::config("removal queue only applies to server connections"));
            }
            _ => {}
        }

        Ok(Conn {
            inner: Arc::new(Inner {
                id: RwLock::new(self.id),
                role: self.role,
                socket: self.socket,
                directory: self.directory,
                codec: self.codec,
                options: self.options,
                closed: AtomicBool::new(false),
                acknowledged: AtomicBool::new(false),
                ack_notify: Notify::new(),
                shutdown: CancellationToken::new(),
                waiting: WaitRegistry::default(),
                reader_started: AtomicBool::new(false),
                removal: self.removal,
            }),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
