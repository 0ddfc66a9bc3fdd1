//! Per-connection protocol engine.
//!
//! A [`Conn`] owns one [`Socket`](crate::transport::Socket) and drives it
//! through the identity handshake, correlates request/reply pairs, routes
//! inbound messages and gates outbound ones.
//!
//! # Architecture
//!
//! ```text
//!              ┌──────────────────── Conn ────────────────────┐
//!   frames ───►│ reader ─► handshake ─► waiting ─► directory   │
//!              │   ▲                                  │        │
//!   frames ◄───│ write gate ◄──── ask / write ◄───────┘        │
//!              └──────────────────────────────────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! 1. `Conn::builder(socket, directory)` - Configure role, id, timeouts
//! 2. `Conn::start` - Spawn the read loop (clients send the `ack` tag)
//! 3. Handshake completes, buffered frames are replayed
//! 4. `write` / `ask` / `connect` from any task
//! 5. `close` - Idempotent teardown, also triggered by read failure
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | [`Conn`] handle, write gate, ask, close |
//! | `context` | [`CallContext`] deadlines and cancellation |
//! | `handshake` | Client/server handshake policies |
//! | `options` | [`ConnOptions`] timeouts and intervals |
//! | `reader` | Read loop and dispatcher |
//! | `waiting` | In-flight reply registry |

// ============================================================================
// Submodules
// ============================================================================

/// Connection handle and lifecycle.
pub mod connection;

/// Deadlines and cancellation for blocking calls.
pub mod context;

/// Identity handshake policies.
pub mod handshake;

/// Connection configuration.
pub mod options;

mod reader;
mod waiting;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Conn, ConnBuilder};
pub use context::CallContext;
pub use handshake::{ClientHandshake, HandshakeAction, HandshakePolicy, ServerHandshake};
pub use options::ConnOptions;

// ============================================================================
// Role
// ============================================================================

/// Which side of the transport a connection sits on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Role {
    /// Dialing side. Adopts the id offered by the server.
    #[default]
    Client,
    /// Accepting side. Id assigned by the registry.
    Server,
}

impl Role {
    /// Returns `true` for the dialing side.
    #[inline]
    #[must_use]
    pub const fn is_client(self) -> bool {
        matches!(self, Self::Client)
    }
}
