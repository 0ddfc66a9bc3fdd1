//! Namespace and room bookkeeping consumed by a connection.
//!
//! The connection never stores which namespaces or rooms it has joined.
//! It asks a [`SessionDirectory`] instead, both to route inbound
//! control-plane frames and to gate outbound writes.
//!
//! Implementations are called from the read loop. A handler that needs to
//! `ask` the same connection must spawn a task for it: the reply can only
//! be delivered once the read loop is free again.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;

use crate::conn::{CallContext, Conn};
use crate::error::Result;
use crate::protocol::Message;

// ============================================================================
// NamespaceSession
// ============================================================================

/// One joined namespace on one connection.
#[async_trait]
pub trait NamespaceSession: Send + Sync {
    /// Namespace name.
    fn namespace(&self) -> &str;

    /// Returns `true` if `room` is currently joined.
    fn is_joined(&self, room: &str) -> bool;

    /// Handles a room join request from the peer.
    async fn reply_room_join(&self, conn: &Conn, msg: Message);

    /// Handles a room leave request from the peer.
    async fn reply_room_leave(&self, conn: &Conn, msg: Message);

    /// Runs the application handler for `msg`.
    ///
    /// # Errors
    ///
    /// Any error is relayed to the peer. [`Error::ManualClose`] additionally
    /// closes the connection.
    ///
    /// [`Error::ManualClose`]: crate::Error::ManualClose
    async fn fire_event(&self, conn: &Conn, msg: Message) -> Result<()>;
}

// ============================================================================
// SessionDirectory
// ============================================================================

/// All namespace sessions of one connection.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    /// Returns the session for `name` if connected.
    fn namespace(&self, name: &str) -> Option<Arc<dyn NamespaceSession>>;

    /// Handles a namespace connect request from the peer.
    async fn reply_connect(&self, conn: &Conn, msg: Message);

    /// Handles a namespace disconnect request from the peer.
    async fn reply_disconnect(&self, conn: &Conn, msg: Message);

    /// Negotiates a new namespace session with the peer.
    async fn ask_connect(
        &self,
        ctx: &CallContext,
        conn: &Conn,
        namespace: &str,
    ) -> Result<Arc<dyn NamespaceSession>>;

    /// Negotiates leaving one namespace.
    async fn ask_disconnect(&self, ctx: &CallContext, conn: &Conn, namespace: &str) -> Result<()>;

    /// Negotiates leaving every namespace.
    async fn disconnect_all(&self, ctx: &CallContext, conn: &Conn) -> Result<()>;

    /// Drops every namespace and room locally without telling the peer.
    ///
    /// Called once from `Conn::close`; must not block.
    fn force_disconnect_all(&self);
}
