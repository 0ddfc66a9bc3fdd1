//! Roomwire - namespaced, room-scoped messaging over WebSocket.
//!
//! This library provides the connection core of a bidirectional messaging
//! system: one [`Conn`] per socket, carrying events addressed to a
//! namespace and optionally a room.
//!
//! # Architecture
//!
//! The protocol is symmetric once connected:
//!
//! - **Client**: dials, opens the handshake, adopts the id the server assigns
//! - **Server**: accepts, assigns an id, keeps every connection in a [`Registry`]
//!
//! Key design principles:
//!
//! - Each [`Conn`] owns: socket + read loop + pending reply registry
//! - Request/reply correlation uses wait tokens, not message ordering
//! - Namespace and room membership live behind [`SessionDirectory`]
//! - Writes are gated on membership; control-plane events bypass the gate
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use roomwire::{CallContext, ConnOptions, Message, Result, SessionDirectory, dial};
//!
//! async fn run(directory: Arc<dyn SessionDirectory>) -> Result<()> {
//!     let conn = dial("ws://127.0.0.1:8080", directory, ConnOptions::new()).await?;
//!
//!     let ctx = CallContext::with_timeout(Duration::from_secs(5));
//!     conn.wait_connect(&ctx, "/chat").await?;
//!
//!     let reply = conn
//!         .ask(&ctx, Message::new("/chat", "hello", b"hi".to_vec()))
//!         .await?;
//!     println!("{}", String::from_utf8_lossy(&reply.body));
//!
//!     conn.close();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`conn`] | [`Conn`], handshake, options, call contexts |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Connection ids and wait tokens |
//! | [`protocol`] | Wire message and codec |
//! | [`session`] | Namespace and room bookkeeping traits |
//! | [`transport`] | Sockets, server, and [`dial`] |

// ============================================================================
// Modules
// ============================================================================

/// Connection core.
///
/// Use [`Conn::builder()`] to wrap a socket, or [`dial`] / [`Server`] for
/// WebSocket endpoints.
pub mod conn;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Connection ids and wait tokens.
pub mod identifiers;

/// Wire message and codec.
pub mod protocol;

/// Namespace and room bookkeeping traits.
pub mod session;

/// Transport layer.
pub mod transport;

#[cfg(test)]
mod test_support;

// ============================================================================
// Re-exports
// ============================================================================

// Connection types
pub use conn::{CallContext, Conn, ConnBuilder, ConnOptions, Role};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnId, WaitToken};

// Protocol types
pub use protocol::{Codec, JsonCodec, Message, events};

// Session traits
pub use session::{NamespaceSession, SessionDirectory};

// Transport types
pub use transport::{
    DirectoryFactory, MemorySocket, Registry, RequestInfo, Server, ServerOptions, Socket,
    WsSocket, dial,
};
