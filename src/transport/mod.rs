//! Transports carrying text frames between two peers.
//!
//! A connection only needs something implementing [`Socket`]: read one
//! frame, write one frame, close. Two implementations ship with the crate.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  dial (client)  │         WebSocket            │  Server         │
//! │                 │◄────────────────────────────►│                 │
//! │  Conn (Client)  │                              │  Registry       │
//! │                 │                              │  → Conn (Server)│
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `socket` | [`Socket`] trait and request metadata |
//! | `websocket` | [`Socket`] over `tokio-tungstenite` |
//! | `memory` | In-process socket pair |
//! | `server` | Accept loop and connection registry |
//! | `client` | [`dial`] |

// ============================================================================
// Submodules
// ============================================================================

/// Client-side dialing.
pub mod client;

/// In-process socket pair.
pub mod memory;

/// WebSocket server and connection registry.
pub mod server;

/// Transport abstraction.
pub mod socket;

/// WebSocket socket.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::dial;
pub use memory::MemorySocket;
pub use server::{DirectoryFactory, Registry, Server, ServerOptions};
pub use socket::{RequestInfo, Socket};
pub use websocket::WsSocket;
